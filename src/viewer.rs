//! Three slice viewports plus the volume panel over one selected study.
//!
//! All tool mutations go through [`MultiPlaneViewer::set_tool`]; viewports
//! only read the shared [`ToolState`]. Fetch results arrive asynchronously
//! and are folded in by [`MultiPlaneViewer::poll_events`], which the UI calls
//! once per tick before painting.

use crate::backend::ImagingBackend;
use crate::camera::OrbitCamera;
use crate::config::ViewerConfig;
use crate::enums::Plane;
use crate::error::{ImagingError, Result};
use crate::gpu_raycaster::VolumeRayCaster;
use crate::raycast::RayCastSettings;
use crate::slice_cache::{SliceCache, SliceRequest};
use crate::slice_fetch::{FetchEvent, Scheduled, SliceFetchController, ViewportId};
use crate::study::{StudyId, StudyRegistry};
use crate::tool_state::{ToolChange, ToolState};
use crate::viewport::{SliceViewport, ViewportFrame, ViewportStatus};
use crate::volume::VolumeBuffer;
use crate::volume_loader::{VolumeLoader, VolumeState};

use glam::Vec2;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Debug)]
pub enum VolumePanel {
    Placeholder,
    Loading,
    Ready(Arc<VolumeBuffer>),
    Failed(String),
}

pub struct MultiPlaneViewer<B> {
    backend: Arc<B>,
    studies: StudyRegistry,
    tools: ToolState,
    viewports: [SliceViewport; 3],
    fetcher: SliceFetchController<B>,
    events: mpsc::UnboundedReceiver<FetchEvent>,
    volumes: VolumeLoader<B>,
    pub camera: OrbitCamera,
    pub render_settings: RayCastSettings,
}

fn index(plane: Plane) -> usize {
    match plane {
        Plane::Axial => 0,
        Plane::Coronal => 1,
        Plane::Sagittal => 2,
    }
}

impl<B: ImagingBackend> MultiPlaneViewer<B> {
    pub fn new(backend: Arc<B>, config: &ViewerConfig) -> Self {
        let (fetcher, events) = SliceFetchController::new(
            Arc::clone(&backend),
            Arc::new(SliceCache::new()),
            config.debounce(),
        );
        let volumes = VolumeLoader::new(Arc::clone(&backend), config.volume_target_size);
        Self {
            backend,
            studies: StudyRegistry::new(),
            tools: ToolState::default(),
            viewports: Plane::ALL.map(SliceViewport::new),
            fetcher,
            events,
            volumes,
            camera: OrbitCamera::default(),
            render_settings: RayCastSettings::new(config.threshold, config.opacity, config.step_count),
        }
    }

    pub fn studies(&self) -> &StudyRegistry {
        &self.studies
    }

    pub fn studies_mut(&mut self) -> &mut StudyRegistry {
        &mut self.studies
    }

    pub fn tools(&self) -> &ToolState {
        &self.tools
    }

    pub fn cache(&self) -> &Arc<SliceCache> {
        self.fetcher.cache()
    }

    pub fn viewport(&self, plane: Plane) -> &SliceViewport {
        &self.viewports[index(plane)]
    }

    fn selected_id(&self) -> Option<StudyId> {
        self.studies.selected().map(|s| s.id)
    }

    /// Uploads a file and registers it; does not change the selection.
    pub async fn upload(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<StudyId> {
        let study = self.studies.upload(&*self.backend, file_name, bytes).await?;
        Ok(study.id)
    }

    /// Binds all panels to `study`. Re-selecting the current study does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn select_study(&mut self, study: StudyId) -> Result<bool> {
        if self.selected_id() == Some(study) {
            return Ok(false);
        }
        if self.studies.select(study).is_none() {
            return Err(ImagingError::InvalidRequest(format!("unknown study {study}")));
        }
        debug!("selected study {study}");

        for viewport in &mut self.viewports {
            viewport.reset(ViewportStatus::Loading);
        }
        for plane in Plane::ALL {
            self.refetch(plane)?;
        }
        self.volumes.load(study);
        Ok(true)
    }

    /// The single entry point for tool changes. Image-affecting changes
    /// re-fetch every viewport once, after the debounce window.
    pub fn set_tool(&mut self, change: ToolChange) -> Result<bool> {
        let changed = self.tools.apply(change)?;
        if changed && change.requires_refetch() {
            self.refetch_all()?;
        }
        Ok(changed)
    }

    pub fn set_tool_named(&mut self, name: &str, value: &str) -> Result<bool> {
        self.set_tool(ToolChange::parse(name, value)?)
    }

    /// Display-only, no viewport re-fetches
    pub fn rotate_90(&mut self) {
        self.tools.rotate_90();
    }

    pub fn reset_tools(&mut self) -> Result<()> {
        let before = self.tools;
        self.tools.reset();
        let image_changed = before.filter != self.tools.filter
            || before.window_center != self.tools.window_center
            || before.window_width != self.tools.window_width;
        if image_changed {
            self.refetch_all()?;
        }
        Ok(())
    }

    pub fn set_slice(&mut self, plane: Plane, slice: u32) -> Result<()> {
        if self.viewports[index(plane)].set_slice(slice)? {
            self.refetch(plane)?;
        }
        Ok(())
    }

    pub fn step_slice(&mut self, plane: Plane, delta: i64) -> Result<()> {
        if self.viewports[index(plane)].step_slice(delta) {
            self.refetch(plane)?;
        }
        Ok(())
    }

    /// Manual re-trigger for a viewport showing an error.
    pub fn retry(&mut self, plane: Plane) -> Result<()> {
        self.refetch(plane)
    }

    fn refetch_all(&mut self) -> Result<()> {
        for plane in Plane::ALL {
            self.refetch(plane)?;
        }
        Ok(())
    }

    fn current_request(&self, plane: Plane) -> Option<Result<SliceRequest>> {
        let study = self.selected_id()?;
        Some(self.viewports[index(plane)].request(study, &self.tools))
    }

    fn refetch(&mut self, plane: Plane) -> Result<()> {
        let Some(request) = self.current_request(plane).transpose()? else {
            return Ok(());
        };
        if self.fetcher.schedule(ViewportId::from(plane), request) == Scheduled::Debouncing {
            self.viewports[index(plane)].mark_loading();
        }
        Ok(())
    }

    /// Folds finished fetches into the viewports. Returns how many events were handled.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            handled += 1;
            let Some(plane) = Plane::ALL
                .into_iter()
                .find(|&p| ViewportId::from(p) == event.viewport())
            else {
                continue;
            };
            let Some(Ok(current)) = self.current_request(plane) else {
                continue;
            };

            match event {
                FetchEvent::Loaded { request, image, .. } => {
                    if request.study != current.study {
                        continue;
                    }
                    let viewport = &mut self.viewports[index(plane)];
                    let before = viewport.current_slice();
                    viewport.on_loaded(&request, image, &current);
                    // First response may move navigation onto the backend's clamped slice
                    if viewport.current_slice() != before {
                        if let Err(err) = self.refetch(plane) {
                            warn!("{plane}: cannot follow backend slice: {err}");
                        }
                    }
                }
                FetchEvent::Failed {
                    request, message, ..
                } => {
                    self.viewports[index(plane)].on_failed(&request, &current, message);
                }
            }
        }
        handled
    }

    pub fn pointer_down(&mut self, plane: Plane, pointer: Vec2) {
        self.viewports[index(plane)].transform.pointer_down(pointer);
    }

    /// Window-level pointer move; drives whichever viewport is being dragged.
    pub fn pointer_move(&mut self, pointer: Vec2) {
        for viewport in &mut self.viewports {
            viewport.transform.pointer_move(pointer);
        }
    }

    /// Window-level pointer release.
    pub fn pointer_up(&mut self) {
        for viewport in &mut self.viewports {
            viewport.transform.pointer_up();
        }
    }

    pub fn viewport_frame(&self, plane: Plane) -> ViewportFrame {
        let viewport = &self.viewports[index(plane)];
        let current = self.current_request(plane).and_then(|r| r.ok());
        viewport.frame(current.as_ref(), self.cache(), &self.tools)
    }

    pub fn volume_panel(&self) -> VolumePanel {
        let Some(study) = self.selected_id() else {
            return VolumePanel::Placeholder;
        };
        match self.volumes.state(study) {
            None | Some(VolumeState::Loading) => VolumePanel::Loading,
            Some(VolumeState::Ready(volume)) => VolumePanel::Ready(volume),
            Some(VolumeState::Failed(message)) => VolumePanel::Failed(message),
        }
    }

    pub fn retry_volume(&self) -> bool {
        self.selected_id()
            .is_some_and(|study| self.volumes.retry(study))
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.render_settings.set_threshold(threshold);
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.render_settings.set_opacity(opacity);
    }

    /// Per-frame volume update: binds the selected study's buffer (releasing the
    /// previous texture on a switch) and draws with the current camera and sliders.
    pub fn draw_volume(&self, caster: &mut VolumeRayCaster, target: &wgpu::TextureView, size: (u32, u32)) {
        let volume = match self.volume_panel() {
            VolumePanel::Ready(volume) => Some(volume),
            _ => None,
        };
        caster.sync(volume.as_ref());
        caster.frame(&self.camera, &self.render_settings, target, size);
    }
}
