//! Display tools shared by the three slice viewports.

use crate::enums::FilterType;
use crate::error::{ImagingError, Result};

pub const ZOOM_RANGE: (f32, f32) = (0.1, 5.0);
pub const WINDOW_CENTER_RANGE: (f32, f32) = (-1000.0, 2000.0);
pub const WINDOW_WIDTH_RANGE: (f32, f32) = (1.0, 4000.0);

/// Display settings shared by all three slice viewports.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToolState {
    pub zoom: f32,
    /// Degrees in `[0, 360)`
    pub rotation: f32,
    pub window_center: f32,
    pub window_width: f32,
    pub filter: FilterType,
}

impl Default for ToolState {
    fn default() -> Self {
        // Soft-tissue window
        Self {
            zoom: 1.0,
            rotation: 0.0,
            window_center: 40.0,
            window_width: 400.0,
            filter: FilterType::Original,
        }
    }
}

/// A single tool mutation, as produced by one slider or selector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToolChange {
    Zoom(f32),
    Rotation(f32),
    WindowCenter(f32),
    WindowWidth(f32),
    Filter(FilterType),
}

impl ToolChange {
    /// Parses a `(tool name, value)` pair as emitted by the toolbar controls.
    pub fn parse(name: &str, value: &str) -> Result<Self> {
        let number = || {
            value
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    ImagingError::InvalidRequest(format!("`{value}` is not a number for {name}"))
                })
        };
        match name {
            "zoom" => Ok(ToolChange::Zoom(number()?)),
            "rotation" => Ok(ToolChange::Rotation(number()?)),
            "window_center" | "windowLevel" => Ok(ToolChange::WindowCenter(number()?)),
            "window_width" | "windowWidth" => Ok(ToolChange::WindowWidth(number()?)),
            "filter" | "filterType" => value
                .parse()
                .map(ToolChange::Filter)
                .map_err(ImagingError::InvalidRequest),
            other => Err(ImagingError::InvalidRequest(format!("unknown tool `{other}`"))),
        }
    }

    /// Whether the change alters the processed image, as opposed to its on-screen placement.
    pub fn requires_refetch(&self) -> bool {
        matches!(
            self,
            ToolChange::WindowCenter(_) | ToolChange::WindowWidth(_) | ToolChange::Filter(_)
        )
    }
}

impl ToolState {
    /// Applies `change`, clamping to the slider ranges. Returns whether anything changed.
    pub fn apply(&mut self, change: ToolChange) -> Result<bool> {
        let before = *self;
        match change {
            ToolChange::Zoom(zoom) => {
                if !(zoom.is_finite() && zoom > 0.0) {
                    return Err(ImagingError::InvalidRequest(format!(
                        "zoom must be > 0, got {zoom}"
                    )));
                }
                self.zoom = zoom.clamp(ZOOM_RANGE.0, ZOOM_RANGE.1);
            }
            ToolChange::Rotation(degrees) => {
                if !degrees.is_finite() {
                    return Err(ImagingError::InvalidRequest("rotation is not finite".into()));
                }
                self.rotation = degrees.rem_euclid(360.0);
            }
            ToolChange::WindowCenter(center) => {
                if !center.is_finite() {
                    return Err(ImagingError::InvalidRequest("window center is not finite".into()));
                }
                self.window_center = center.clamp(WINDOW_CENTER_RANGE.0, WINDOW_CENTER_RANGE.1);
            }
            ToolChange::WindowWidth(width) => {
                if !width.is_finite() {
                    return Err(ImagingError::InvalidRequest("window width is not finite".into()));
                }
                self.window_width = width.clamp(WINDOW_WIDTH_RANGE.0, WINDOW_WIDTH_RANGE.1);
            }
            ToolChange::Filter(filter) => self.filter = filter,
        }
        Ok(*self != before)
    }

    pub fn rotate_90(&mut self) {
        self.rotation = (self.rotation + 90.0).rem_euclid(360.0);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
