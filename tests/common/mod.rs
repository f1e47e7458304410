//! Shared fixtures for the viewer integration tests

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{GrayImage, ImageFormat, Luma};
use imaging_viewer::backend::{ProcessResponse, UploadResponse, VolumeResponse};
use imaging_viewer::{
    ImagingBackend, ImagingError, MultiPlaneViewer, Plane, Result, SliceRequest, Study, StudyId,
    ViewerConfig,
};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use web_time::SystemTime;

pub const DEBOUNCE: Duration = Duration::from_millis(100);
pub const LATENCY: Duration = Duration::from_millis(30);

/// Encodes a uniform greyscale PNG as the backend does, inside a data URI.
pub fn png_data_uri(width: u32, height: u32, value: u8) -> String {
    let image = GrayImage::from_pixel(width, height, Luma([value]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("PNG encoding into memory");
    format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner()))
}

/// `dim³` zero volume with a 255 cube of edge `cube` at its center, row-major.
pub fn cube_volume(dim: usize, cube: usize) -> Vec<u8> {
    let start = (dim - cube) / 2;
    let inside = |i: usize| (start..start + cube).contains(&i);
    let mut data = vec![0u8; dim * dim * dim];
    for z in 0..dim {
        for y in 0..dim {
            for x in 0..dim {
                if inside(x) && inside(y) && inside(z) {
                    data[(z * dim + y) * dim + x] = 255;
                }
            }
        }
    }
    data
}

/// In-memory backend recording every call. Slices are clamped like the real
/// backend does and rendered as uniform PNGs.
pub struct MockBackend {
    pub process_calls: Mutex<Vec<SliceRequest>>,
    pub volume_calls: Mutex<Vec<(StudyId, u32)>>,
    pub uploads: Mutex<Vec<String>>,
    pub total_slices: HashMap<Plane, u32>,
    pub failing_planes: Mutex<HashSet<Plane>>,
    pub volume: Option<([usize; 3], Vec<u8>)>,
    pub latency: Duration,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            process_calls: Mutex::new(Vec::new()),
            volume_calls: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            total_slices: HashMap::from([
                (Plane::Axial, 40),
                (Plane::Coronal, 256),
                (Plane::Sagittal, 256),
            ]),
            failing_planes: Mutex::new(HashSet::new()),
            volume: Some(([8, 8, 8], cube_volume(8, 2))),
            latency: LATENCY,
        }
    }
}

impl MockBackend {
    pub fn process_calls(&self) -> Vec<SliceRequest> {
        self.process_calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, plane: Plane) -> Vec<SliceRequest> {
        self.process_calls()
            .into_iter()
            .filter(|r| r.plane == plane)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.process_calls.lock().unwrap().clear();
    }

    pub fn fail_plane(&self, plane: Plane) {
        self.failing_planes.lock().unwrap().insert(plane);
    }

    pub fn heal_plane(&self, plane: Plane) {
        self.failing_planes.lock().unwrap().remove(&plane);
    }
}

impl ImagingBackend for MockBackend {
    async fn process_slice(&self, request: &SliceRequest) -> Result<ProcessResponse> {
        self.process_calls.lock().unwrap().push(*request);
        tokio::time::sleep(self.latency).await;
        if self.failing_planes.lock().unwrap().contains(&request.plane) {
            return Err(ImagingError::Status {
                status: 500,
                message: format!("cannot process {}", request.plane),
            });
        }
        let total = self.total_slices[&request.plane];
        Ok(ProcessResponse {
            success: true,
            image: Some(png_data_uri(8, 8, (request.window_width / 10.0) as u8)),
            total_slices: Some(total),
            current_slice: Some(request.slice_index.min(total - 1)),
            error: None,
        })
    }

    async fn volume_data(&self, study: StudyId, target_size: u32) -> Result<VolumeResponse> {
        self.volume_calls.lock().unwrap().push((study, target_size));
        tokio::time::sleep(self.latency).await;
        Ok(match &self.volume {
            Some((dimensions, data)) => VolumeResponse {
                success: true,
                data: Some(STANDARD.encode(data)),
                dimensions: Some(*dimensions),
                spacing: Some([1.0, 1.0, 1.0]),
                error: None,
            },
            None => VolumeResponse {
                error: Some("File not found".into()),
                ..Default::default()
            },
        })
    }

    async fn upload(&self, file_name: &str, _bytes: Vec<u8>) -> Result<UploadResponse> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(file_name.to_string());
        Ok(UploadResponse {
            id: StudyId(100 + uploads.len() as u64),
            file: Some(format!("uploads/{file_name}")),
        })
    }
}

pub fn config() -> ViewerConfig {
    ViewerConfig {
        debounce_ms: DEBOUNCE.as_millis() as u64,
        ..ViewerConfig::default()
    }
}

/// Viewer over `backend` with studies 1 and 2 registered, none selected.
pub fn viewer(backend: &Arc<MockBackend>) -> MultiPlaneViewer<MockBackend> {
    let mut viewer = MultiPlaneViewer::new(Arc::clone(backend), &config());
    for id in [1, 2] {
        viewer.studies_mut().add(Study {
            id: StudyId(id),
            name: format!("study-{id}.dcm"),
            date: SystemTime::now(),
            path: None,
        });
    }
    viewer
}

/// Lets debounce timers and mock calls run to completion, then folds the results in.
pub async fn settle(viewer: &mut MultiPlaneViewer<MockBackend>) -> usize {
    let mut handled = 0;
    for _ in 0..4 {
        tokio::time::sleep(DEBOUNCE + LATENCY).await;
        handled += viewer.poll_events();
    }
    handled
}
