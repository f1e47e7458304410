//! Memoization of processed 2D slices.
//!
//! A [`SliceRequest`] is its own cache key: every parameter that changes the
//! backend's output (study, plane, slice index, filter, window center and
//! width) is part of it, so a hit can never be stale. The cache has no
//! eviction; it grows for the lifetime of the viewer session.

use crate::enums::{FilterType, Plane};
use crate::error::{ImagingError, Result};
use crate::study::StudyId;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::GrayImage;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

#[derive(Clone, Copy, Debug, Serialize)]
pub struct SliceRequest {
    #[serde(rename = "file_id")]
    pub study: StudyId,
    pub plane: Plane,
    pub slice_index: u32,
    pub filter_type: FilterType,
    pub window_center: f32,
    pub window_width: f32,
}

impl SliceRequest {
    pub fn new(
        study: StudyId,
        plane: Plane,
        slice_index: u32,
        filter_type: FilterType,
        window_center: f32,
        window_width: f32,
    ) -> Result<Self> {
        if !window_center.is_finite() {
            return Err(ImagingError::InvalidRequest(format!(
                "window center {window_center} is not finite"
            )));
        }
        if !(window_width.is_finite() && window_width > 0.0) {
            return Err(ImagingError::InvalidRequest(format!(
                "window width must be > 0, got {window_width}"
            )));
        }
        Ok(Self {
            study,
            plane,
            slice_index,
            filter_type,
            window_center,
            window_width,
        })
    }

    // -0.0 and 0.0 are the same window
    fn float_bits(value: f32) -> u32 {
        if value == 0.0 { 0 } else { value.to_bits() }
    }
}

impl PartialEq for SliceRequest {
    fn eq(&self, other: &Self) -> bool {
        self.study == other.study
            && self.plane == other.plane
            && self.slice_index == other.slice_index
            && self.filter_type == other.filter_type
            && Self::float_bits(self.window_center) == Self::float_bits(other.window_center)
            && Self::float_bits(self.window_width) == Self::float_bits(other.window_width)
    }
}

impl Eq for SliceRequest {}

impl Hash for SliceRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.study.hash(state);
        self.plane.hash(state);
        self.slice_index.hash(state);
        self.filter_type.hash(state);
        Self::float_bits(self.window_center).hash(state);
        Self::float_bits(self.window_width).hash(state);
    }
}

/// A processed slice as returned by the backend.
#[derive(Clone, Debug)]
pub struct SliceImage {
    pub encoded: Vec<u8>,
    pub image: GrayImage,
    pub total_slices: u32,
    pub current_slice: u32,
}

impl SliceImage {
    /// Decodes a PNG given either as a `data:` URI or as bare base64.
    pub fn decode(payload: &str, total_slices: u32, current_slice: u32) -> Result<Self> {
        let b64 = match payload.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            Some(_) => {
                return Err(ImagingError::Decode("malformed data URI".into()));
            }
            None => payload,
        };
        let encoded = STANDARD.decode(b64.trim())?;
        let image = image::load_from_memory(&encoded)?.into_luma8();
        Ok(Self {
            encoded,
            image,
            total_slices,
            current_slice,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[derive(Debug, Default)]
pub struct SliceCache {
    entries: RwLock<HashMap<SliceRequest, Arc<SliceImage>>>,
}

impl SliceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SliceRequest) -> Option<Arc<SliceImage>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn contains(&self, key: &SliceRequest) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(key)
    }

    pub fn put(&self, key: SliceRequest, value: Arc<SliceImage>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        debug!(
            "caching {} slice {} of study {} ({} entries)",
            key.plane,
            key.slice_index,
            key.study,
            entries.len() + 1
        );
        entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
