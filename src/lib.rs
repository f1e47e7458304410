//! # Imaging viewer core
//!
//! This crate serves the client-side core of a medical imaging viewer that
//! talks to a slice-processing backend. A study is shown in three synchronized
//! slice viewports and one interactive 3D volume panel:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!  - Volume (GPU ray-cast)
//!
//! Slices are rendered by the backend (windowing and filtering happen server
//! side) and requested through a per-viewport debounced controller, so a burst
//! of slider or tool changes results in one request per viewport. Responses
//! are kept in an in-memory cache keyed by every parameter that affects the
//! image. Volumes are fetched once per study as a downsampled 8-bit buffer,
//! uploaded into a 3D texture and ray-marched with wgpu. A CPU reference
//! renderer using rayon produces the same compositing for headless use.
//!
//! Assumptions about the backend:
//!  - Slice images are 8-bit greyscale PNGs delivered as data URIs
//!  - The backend clamps out-of-range slice indices and reports the clamped one
//!  - Volume buffers are row-major, slowest axis first
//!
//! # Roadmap
//!
//!  - Bounded slice cache with LRU eviction
//!  - Colour transfer functions for the volume panel
//!  - Gradient-based shading
//!
//! # Examples
//!
//! ## Loading a study and reading the axial viewport
//!
//! ```no_run
//! # use imaging_viewer::{HttpBackend, MultiPlaneViewer, Plane, StudyId, ViewerConfig};
//! # use std::sync::Arc;
//! # async fn run() -> imaging_viewer::Result<()> {
//! let config = ViewerConfig::from_env()?;
//! let backend = Arc::new(HttpBackend::new(&config)?);
//! let mut viewer = MultiPlaneViewer::new(backend, &config);
//!
//! let study = viewer.upload("head.dcm", std::fs::read("head.dcm")?).await?;
//! viewer.select_study(study)?;
//! tokio::time::sleep(config.debounce() * 4).await;
//! viewer.poll_events();
//!
//! let frame = viewer.viewport_frame(Plane::Axial);
//! if let Some(label) = frame.slice_label() {
//!     println!("axial {label}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod camera;
pub mod config;
pub mod enums;
pub mod error;
pub mod gpu_raycaster;
mod interpolator;
pub mod raycast;
pub mod slice_cache;
pub mod slice_fetch;
pub mod study;
pub mod tool_state;
pub mod viewer;
pub mod viewport;
pub mod volume;
pub mod volume_loader;

pub use backend::{HttpBackend, ImagingBackend};
pub use camera::OrbitCamera;
pub use config::ViewerConfig;
pub use enums::{FilterType, Plane};
pub use error::{ImagingError, Result};
pub use gpu_raycaster::{VolumeRayCaster, WGPU};
pub use raycast::RayCastSettings;
pub use slice_cache::{SliceCache, SliceImage, SliceRequest};
pub use slice_fetch::{FetchEvent, SliceFetchController, ViewportId};
pub use study::{Study, StudyId, StudyRegistry};
pub use tool_state::{ToolChange, ToolState};
pub use viewer::{MultiPlaneViewer, VolumePanel};
pub use viewport::{SliceViewport, ViewportFrame, ViewportStatus};
pub use volume::VolumeBuffer;
pub use volume_loader::{VolumeLoader, VolumeState};
