//! Ray-marching volume renderer, CPU side.
//!
//! The volume occupies the axis-aligned box `[-0.5, 0.5]³` in object space
//! and is addressed as a `[0, 1]³` texture. Each pixel's ray is clipped to
//! the box with the slab method and marched front to back in `step_count`
//! uniform steps. Samples at or below the threshold contribute nothing;
//! above it, opacity grows linearly with `value - threshold`.
//!
//! [`march`] is the reference for the WGSL shader in
//! `shaders/volume_raycast.wgsl` and [`render_cpu`] is the fallback when no
//! GPU adapter is available.

use crate::camera::OrbitCamera;
use crate::error::{ImagingError, Result};
use crate::volume::VolumeBuffer;

use glam::{Mat4, Vec3, Vec4};
use image::RgbaImage;
use rayon::prelude::*;

/// Hard cap on samples per ray
pub const MAX_STEPS: u32 = 256;
/// Brightness multiplier applied to every sample's opacity
pub const ALPHA_SCALE: f32 = 25.0;
pub const EARLY_EXIT_ALPHA: f32 = 0.95;

const BOX_MIN: Vec3 = Vec3::splat(-0.5);
const BOX_MAX: Vec3 = Vec3::splat(0.5);

/// Transfer function and sampling parameters, the two sliders plus step count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastSettings {
    pub threshold: f32,
    pub opacity: f32,
    pub step_count: u32,
}

impl Default for RayCastSettings {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            opacity: 1.0,
            step_count: 128,
        }
    }
}

impl RayCastSettings {
    pub fn new(threshold: f32, opacity: f32, step_count: u32) -> Self {
        let mut settings = Self::default();
        settings.set_threshold(threshold);
        settings.set_opacity(opacity);
        settings.set_step_count(step_count);
        settings
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        if threshold.is_finite() {
            self.threshold = threshold.clamp(0.0, 1.0);
        }
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        if opacity.is_finite() {
            self.opacity = opacity.clamp(0.1, 5.0);
        }
    }

    pub fn set_step_count(&mut self, steps: u32) {
        self.step_count = steps.clamp(1, MAX_STEPS);
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Re-expresses a world-space ray in the volume's object space.
    pub fn to_object_space(&self, model_inverse: &Mat4) -> Ray {
        Ray::new(
            model_inverse.transform_point3(self.origin),
            model_inverse.transform_vector3(self.direction),
        )
    }

    /// Ray from the camera through the center of pixel `(x, y)` of a `width × height` target.
    pub fn through_pixel(inverse_view_projection: &Mat4, eye: Vec3, x: u32, y: u32, width: u32, height: u32) -> Ray {
        let ndc_x = (x as f32 + 0.5) / width as f32 * 2.0 - 1.0;
        let ndc_y = 1.0 - (y as f32 + 0.5) / height as f32 * 2.0;
        let far = inverse_view_projection.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
        Ray::new(eye, far - eye)
    }
}

/// Parametric interval where a ray overlaps the unit box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxHit {
    pub t_near: f32,
    pub t_far: f32,
}

impl BoxHit {
    /// Disjoint slabs, or the whole overlap lies behind the origin.
    pub fn is_miss(&self) -> bool {
        self.t_near > self.t_far || self.t_far < 0.0
    }
}

/// Slab test against `[-0.5, 0.5]³`.
pub fn intersect_unit_box(ray: &Ray) -> BoxHit {
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;

    for axis in 0..3 {
        let origin = ray.origin[axis];
        let direction = ray.direction[axis];
        let (lo, hi) = (BOX_MIN[axis], BOX_MAX[axis]);

        if direction == 0.0 {
            // Parallel to the slab: inside it everywhere or nowhere
            if origin < lo || origin > hi {
                return BoxHit {
                    t_near: f32::INFINITY,
                    t_far: f32::NEG_INFINITY,
                };
            }
            continue;
        }

        let inv = 1.0 / direction;
        let t_a = (lo - origin) * inv;
        let t_b = (hi - origin) * inv;
        t_near = t_near.max(t_a.min(t_b));
        t_far = t_far.min(t_a.max(t_b));
    }

    BoxHit { t_near, t_far }
}

/// Marches `ray` (object space) through `volume`.
///
/// Returns premultiplied grey `[r, g, b, a]`, or `None` when the pixel is
/// discarded because the ray missed the box or accumulated no opacity.
pub fn march(volume: &VolumeBuffer, ray: &Ray, settings: &RayCastSettings) -> Option<[f32; 4]> {
    march_observed(volume, ray, settings, |_| {})
}

/// [`march`], reporting the accumulated alpha after every sample.
pub fn march_observed(
    volume: &VolumeBuffer,
    ray: &Ray,
    settings: &RayCastSettings,
    mut on_sample: impl FnMut(f32),
) -> Option<[f32; 4]> {
    let hit = intersect_unit_box(ray);
    if hit.is_miss() {
        return None;
    }

    let steps = settings.step_count.clamp(1, MAX_STEPS);
    let mut t = hit.t_near.max(0.0);
    let t_end = hit.t_far;
    let step_size = (t_end - t) / steps as f32;

    let mut color = 0.0f32;
    let mut alpha = 0.0f32;
    for _ in 0..steps {
        if t > t_end || alpha >= EARLY_EXIT_ALPHA {
            break;
        }
        let value = volume.sample(ray.at(t) + 0.5);
        if value > settings.threshold {
            let sample_alpha = ((value - settings.threshold) * settings.opacity * step_size * ALPHA_SCALE)
                .clamp(0.0, 1.0);
            color += (1.0 - alpha) * value * sample_alpha;
            alpha += (1.0 - alpha) * sample_alpha;
        }
        on_sample(alpha);
        t += step_size;
    }

    (alpha > 0.0).then_some([color, color, color, alpha])
}

/// Renders a `width × height` frame on the CPU, rows in parallel.
///
/// Discarded pixels are fully transparent; the rest carry premultiplied grey.
pub fn render_cpu(
    volume: &VolumeBuffer,
    camera: &OrbitCamera,
    model: &Mat4,
    settings: &RayCastSettings,
    width: u32,
    height: u32,
) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(ImagingError::InvalidRequest(format!(
            "cannot render a {width}x{height} frame"
        )));
    }
    let inverse_view_projection = camera.view_projection(width as f32 / height as f32).inverse();
    let eye = camera.eye();
    let model_inverse = model.inverse();

    let mut pixels = vec![0u8; width as usize * height as usize * 4];
    pixels
        .par_chunks_mut(width as usize * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let ray = Ray::through_pixel(&inverse_view_projection, eye, x as u32, y as u32, width, height)
                    .to_object_space(&model_inverse);
                if let Some(rgba) = march(volume, &ray, settings) {
                    let rgba = Vec4::from(rgba).clamp(Vec4::ZERO, Vec4::ONE) * 255.0;
                    pixel.copy_from_slice(&rgba.round().to_array().map(|c| c as u8));
                }
            }
        });

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| ImagingError::InvalidRequest("frame buffer size mismatch".into()))
}
