use ndarray::ArrayView3;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Samples `volume` at normalized texture coordinates the way a linearly
    /// filtered, clamp-to-edge 3D texture does: texel centers sit at
    /// `(i + 0.5) / n` and `u, v, w` address width, height and depth.
    pub(crate) fn sample_normalized(volume: &ArrayView3<u8>, u: f32, v: f32, w: f32) -> f32 {
        let (depth, height, width) = volume.dim();
        let to_texel = |coord: f32, n: usize| (coord * n as f32 - 0.5).clamp(0.0, (n - 1) as f32);
        Self::trilinear_interpolate(
            volume,
            to_texel(w, depth),
            to_texel(v, height),
            to_texel(u, width),
        ) / 255.0
    }

    #[inline]
    pub(crate) fn trilinear_interpolate(volume: &ArrayView3<u8>, z: f32, y: f32, x: f32) -> f32 {
        let (depth, height, width) = volume.dim();

        let z0 = z.floor() as usize;
        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let z1 = (z0 + 1).min(depth - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dz = z - z0 as f32;
        let dy = y - y0 as f32;
        let dx = x - x0 as f32;

        let at = |z: usize, y: usize, x: usize| volume[[z, y, x]] as f32;
        let lerp = |a: f32, b: f32, t: f32| (b - a).mul_add(t, a);

        let c00 = lerp(at(z0, y0, x0), at(z0, y0, x1), dx);
        let c01 = lerp(at(z0, y1, x0), at(z0, y1, x1), dx);
        let c10 = lerp(at(z1, y0, x0), at(z1, y0, x1), dx);
        let c11 = lerp(at(z1, y1, x0), at(z1, y1, x1), dx);

        let c0 = lerp(c00, c01, dy);
        let c1 = lerp(c10, c11, dy);

        lerp(c0, c1, dz)
    }
}
