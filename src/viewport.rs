//! Per-plane slice viewport: drag-to-pan, slice navigation and what to paint.

use crate::enums::Plane;
use crate::error::{ImagingError, Result};
use crate::slice_cache::{SliceCache, SliceImage, SliceRequest};
use crate::study::StudyId;
use crate::tool_state::ToolState;

use glam::{Affine2, Vec2};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragState {
    Idle,
    /// Pointer position minus pan at pointer-down
    Dragging { anchor: Vec2 },
}

/// Drag-to-pan state of one viewport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportTransform {
    pub pan: Vec2,
    pub drag: DragState,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            drag: DragState::Idle,
        }
    }
}

impl ViewportTransform {
    pub fn pointer_down(&mut self, pointer: Vec2) {
        self.drag = DragState::Dragging {
            anchor: pointer - self.pan,
        };
    }

    pub fn pointer_move(&mut self, pointer: Vec2) {
        if let DragState::Dragging { anchor } = self.drag {
            self.pan = pointer - anchor;
        }
    }

    /// Ends a drag. Fed from a window-level listener so releases outside the viewport count.
    pub fn pointer_up(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    /// `translate(pan) · scale(zoom) · rotate(rotation)`
    pub fn matrix(&self, tools: &ToolState) -> Affine2 {
        Affine2::from_translation(self.pan)
            * Affine2::from_scale(Vec2::splat(tools.zoom))
            * Affine2::from_angle(tools.rotation.to_radians())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ViewportStatus {
    /// No study selected
    Placeholder,
    Loading,
    Ready,
    Failed(String),
}

/// Everything the UI needs to paint one slice viewport for a frame.
#[derive(Clone, Debug)]
pub struct ViewportFrame {
    pub label: &'static str,
    pub status: ViewportStatus,
    pub image: Option<Arc<SliceImage>>,
    /// Image belongs to an older request
    pub stale: bool,
    pub current_slice: u32,
    pub total_slices: Option<u32>,
    pub transform: Affine2,
}

impl ViewportFrame {
    /// `"3 / 40"`, one-based
    pub fn slice_label(&self) -> Option<String> {
        self.total_slices
            .map(|total| format!("{} / {total}", self.current_slice + 1))
    }
}

/// One plane's viewport: slice navigation, pan and what it currently shows.
#[derive(Debug)]
pub struct SliceViewport {
    plane: Plane,
    current_slice: u32,
    total_slices: Option<u32>,
    pub transform: ViewportTransform,
    status: ViewportStatus,
    shown: Option<Arc<SliceImage>>,
}

impl SliceViewport {
    pub fn new(plane: Plane) -> Self {
        Self {
            plane,
            current_slice: 0,
            total_slices: None,
            transform: ViewportTransform::default(),
            status: ViewportStatus::Placeholder,
            shown: None,
        }
    }

    pub fn plane(&self) -> Plane {
        self.plane
    }

    pub fn current_slice(&self) -> u32 {
        self.current_slice
    }

    pub fn total_slices(&self) -> Option<u32> {
        self.total_slices
    }

    pub fn status(&self) -> &ViewportStatus {
        &self.status
    }

    /// Forgets navigation and the shown image, e.g. when another study is selected.
    pub fn reset(&mut self, status: ViewportStatus) {
        self.current_slice = 0;
        self.total_slices = None;
        self.transform = ViewportTransform::default();
        self.status = status;
        self.shown = None;
    }

    pub fn request(&self, study: StudyId, tools: &ToolState) -> Result<SliceRequest> {
        SliceRequest::new(
            study,
            self.plane,
            self.current_slice,
            tools.filter,
            tools.window_center,
            tools.window_width,
        )
    }

    /// Jumps to `index`. Out-of-range indices are rejected.
    pub fn set_slice(&mut self, index: u32) -> Result<bool> {
        let total = self.total_slices.ok_or_else(|| {
            ImagingError::InvalidRequest(format!("{} slice count not known yet", self.plane))
        })?;
        if index >= total {
            return Err(ImagingError::InvalidRequest(format!(
                "slice {index} outside 0..{total} for {}",
                self.plane
            )));
        }
        let changed = index != self.current_slice;
        self.current_slice = index;
        Ok(changed)
    }

    /// Moves by `delta` slices, clamped to `[0, total)`.
    pub fn step_slice(&mut self, delta: i64) -> bool {
        let Some(total) = self.total_slices.filter(|&t| t > 0) else {
            return false;
        };
        let target = (self.current_slice as i64 + delta).clamp(0, total as i64 - 1) as u32;
        let changed = target != self.current_slice;
        self.current_slice = target;
        changed
    }

    pub fn mark_loading(&mut self) {
        self.status = ViewportStatus::Loading;
    }

    /// Records a successful response. Slice bounds come from the first response only.
    pub fn on_loaded(&mut self, request: &SliceRequest, image: Arc<SliceImage>, current: &SliceRequest) {
        if self.total_slices.is_none() {
            let total = image.total_slices.max(1);
            self.total_slices = Some(total);
            self.current_slice = image.current_slice.min(total - 1);
        } else {
            self.total_slices = Some(image.total_slices.max(1));
            self.current_slice = self.current_slice.min(image.total_slices.max(1) - 1);
        }
        if request == current {
            self.status = ViewportStatus::Ready;
            self.shown = Some(image);
        }
    }

    pub fn on_failed(&mut self, request: &SliceRequest, current: &SliceRequest, message: String) {
        if request == current {
            self.status = ViewportStatus::Failed(message);
        }
    }

    pub fn frame(&self, current: Option<&SliceRequest>, cache: &SliceCache, tools: &ToolState) -> ViewportFrame {
        let hit = current.and_then(|key| cache.get(key));
        let stale = hit.is_none() && self.shown.is_some();
        ViewportFrame {
            label: self.plane.label(),
            status: self.status.clone(),
            image: hit.or_else(|| self.shown.clone()),
            stale,
            current_slice: self.current_slice,
            total_slices: self.total_slices,
            transform: self.transform.matrix(tools),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::FilterType;
    use crate::slice_cache::tests::png_data_uri;
    use approx::assert_relative_eq;

    fn image(total: u32, current: u32) -> Arc<SliceImage> {
        Arc::new(SliceImage::decode(&png_data_uri(2, 2, 1), total, current).unwrap())
    }

    #[test]
    fn drag_follows_pointer_from_anchor() {
        let mut transform = ViewportTransform::default();
        transform.pan = Vec2::new(10.0, 5.0);
        transform.pointer_down(Vec2::new(100.0, 100.0));
        assert!(transform.is_dragging());

        transform.pointer_move(Vec2::new(130.0, 80.0));
        assert_eq!(transform.pan, Vec2::new(40.0, -15.0));

        transform.pointer_up();
        transform.pointer_move(Vec2::new(500.0, 500.0));
        assert_eq!(transform.pan, Vec2::new(40.0, -15.0));
    }

    #[test]
    fn matrix_translates_after_scaling_and_rotating() {
        let transform = ViewportTransform {
            pan: Vec2::new(10.0, 0.0),
            drag: DragState::Idle,
        };
        let tools = ToolState {
            zoom: 2.0,
            rotation: 90.0,
            ..Default::default()
        };
        let p = transform.matrix(&tools).transform_point2(Vec2::new(1.0, 0.0));
        assert_relative_eq!(p.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn navigation_stays_within_bounds() {
        let mut viewport = SliceViewport::new(Plane::Axial);
        assert!(viewport.set_slice(0).is_err());

        let request = viewport.request(StudyId(1), &ToolState::default()).unwrap();
        viewport.on_loaded(&request, image(10, 0), &request);
        assert_eq!(viewport.total_slices(), Some(10));

        assert!(viewport.set_slice(10).is_err());
        assert!(viewport.set_slice(9).unwrap());
        assert!(!viewport.step_slice(5));
        assert_eq!(viewport.current_slice(), 9);
        assert!(viewport.step_slice(-100));
        assert_eq!(viewport.current_slice(), 0);
    }

    #[test]
    fn stale_responses_do_not_change_status() {
        let mut viewport = SliceViewport::new(Plane::Sagittal);
        let tools = ToolState::default();
        let old = viewport.request(StudyId(1), &tools).unwrap();
        let current = SliceRequest {
            filter_type: FilterType::Sharpen,
            ..old
        };
        viewport.mark_loading();
        viewport.on_failed(&old, &current, "timeout".into());
        assert_eq!(viewport.status(), &ViewportStatus::Loading);
        viewport.on_loaded(&old, image(4, 0), &current);
        assert_eq!(viewport.status(), &ViewportStatus::Loading);
        assert_eq!(viewport.total_slices(), Some(4));
    }

    #[test]
    fn frame_falls_back_to_previous_image() {
        let mut viewport = SliceViewport::new(Plane::Coronal);
        let tools = ToolState::default();
        let cache = SliceCache::new();
        let first = viewport.request(StudyId(1), &tools).unwrap();
        cache.put(first, image(3, 0));
        viewport.on_loaded(&first, image(3, 0), &first);

        viewport.set_slice(2).unwrap();
        let next = viewport.request(StudyId(1), &tools).unwrap();
        let frame = viewport.frame(Some(&next), &cache, &tools);
        assert!(frame.stale);
        assert!(frame.image.is_some());
        assert_eq!(frame.slice_label().as_deref(), Some("3 / 3"));
    }
}
