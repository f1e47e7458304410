use crate::error::{ImagingError, Result};
use crate::interpolator::Interpolator;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use glam::Vec3;
use ndarray::Array3;

/// Downsampled 8-bit intensity volume, laid out (depth, height, width).
///
/// Write-once: the buffer is built from a backend response and never mutated,
/// so it can be shared between the loader and the ray-caster behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeBuffer {
    data: Array3<u8>,
    spacing: Option<(f32, f32, f32)>,
}

impl VolumeBuffer {
    pub fn new(data: Array3<u8>) -> Result<Self> {
        let (depth, height, width) = data.dim();
        if depth == 0 || height == 0 || width == 0 {
            return Err(ImagingError::InvalidDimensions {
                dims: data.dim(),
                actual: data.len(),
            });
        }
        // Standard layout so the bytes can be uploaded as-is
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Ok(Self {
            data,
            spacing: None,
        })
    }

    pub fn from_raw(bytes: Vec<u8>, dims: (usize, usize, usize)) -> Result<Self> {
        let actual = bytes.len();
        let expected = dims.0.checked_mul(dims.1).and_then(|n| n.checked_mul(dims.2));
        if expected != Some(actual) {
            return Err(ImagingError::InvalidDimensions { dims, actual });
        }
        let data = Array3::from_shape_vec(dims, bytes)
            .map_err(|_| ImagingError::InvalidDimensions { dims, actual })?;
        Self::new(data)
    }

    pub fn from_base64(encoded: &str, dims: (usize, usize, usize)) -> Result<Self> {
        let bytes = STANDARD.decode(encoded.trim())?;
        Self::from_raw(bytes, dims)
    }

    pub fn with_spacing(mut self, spacing: (f32, f32, f32)) -> Self {
        self.spacing = Some(spacing);
        self
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    /// Voxel spacing of the resampled grid as reported by the backend
    pub fn spacing(&self) -> Option<(f32, f32, f32)> {
        self.spacing
    }

    /// Contiguous bytes in (depth, height, width) order
    pub fn as_bytes(&self) -> &[u8] {
        // Always standard layout, see `new`
        self.data.as_slice().unwrap_or_default()
    }

    /// Linearly filtered intensity in `[0, 1]` at texture coordinates in `[0, 1]³`
    pub fn sample(&self, tex: Vec3) -> f32 {
        Interpolator::sample_normalized(&self.data.view(), tex.x, tex.y, tex.z)
    }
}
