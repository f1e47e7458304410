use crate::backend::ImagingBackend;
use crate::error::{ImagingError, Result};
use crate::study::StudyId;
use crate::volume::VolumeBuffer;

use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug)]
pub enum VolumeState {
    Loading,
    Ready(Arc<VolumeBuffer>),
    Failed(String),
}

/// Fetches downsampled volume buffers, at most one request per study.
///
/// States are kept per study for the session, so re-selecting a study that
/// is loading or loaded never issues another request. Failures stay failed
/// until [`VolumeLoader::retry`] is called.
///
/// Loaded buffers are retained for every study visited, not only the selected
/// one; memory grows with the number of studies opened in a session. Call
/// [`VolumeLoader::evict`] to release the buffers of studies no longer shown.
pub struct VolumeLoader<B> {
    backend: Arc<B>,
    target_size: u32,
    states: Arc<Mutex<HashMap<StudyId, VolumeState>>>,
}

impl<B: ImagingBackend> VolumeLoader<B> {
    pub fn new(backend: Arc<B>, target_size: u32) -> Self {
        Self {
            backend,
            target_size,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<StudyId, VolumeState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self, study: StudyId) -> Option<VolumeState> {
        self.states().get(&study).cloned()
    }

    /// Starts loading `study` in the background unless it was requested before.
    /// Returns whether a request was issued.
    ///
    /// Must be called from within a tokio runtime.
    pub fn load(&self, study: StudyId) -> bool {
        {
            let mut states = self.states();
            if states.contains_key(&study) {
                return false;
            }
            states.insert(study, VolumeState::Loading);
        }

        let backend = Arc::clone(&self.backend);
        let states = Arc::clone(&self.states);
        let target_size = self.target_size;
        tokio::spawn(async move {
            let state = match Self::fetch_with(&*backend, study, target_size).await {
                Ok(volume) => {
                    info!("volume for study {study} loaded: {:?}", volume.dim());
                    VolumeState::Ready(Arc::new(volume))
                }
                Err(err) => {
                    warn!("volume for study {study} failed: {err}");
                    VolumeState::Failed(err.to_string())
                }
            };
            states
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(study, state);
        });
        true
    }

    /// Forgets every study except `keep` and loads still in flight. A dropped
    /// study loads again on its next [`VolumeLoader::load`]. Returns how many
    /// entries were released.
    pub fn evict(&self, keep: Option<StudyId>) -> usize {
        let mut states = self.states();
        let before = states.len();
        states.retain(|study, state| {
            Some(*study) == keep || matches!(state, VolumeState::Loading)
        });
        before - states.len()
    }

    /// Manual retry after a failure. No-op for studies that are loading or loaded.
    pub fn retry(&self, study: StudyId) -> bool {
        {
            let mut states = self.states();
            if !matches!(states.get(&study), Some(VolumeState::Failed(_))) {
                return false;
            }
            states.remove(&study);
        }
        self.load(study)
    }

    /// Fetches and decodes a volume directly, bypassing the per-study state.
    pub async fn fetch(&self, study: StudyId) -> Result<VolumeBuffer> {
        Self::fetch_with(&*self.backend, study, self.target_size).await
    }

    async fn fetch_with(backend: &B, study: StudyId, target_size: u32) -> Result<VolumeBuffer> {
        let response = backend.volume_data(study, target_size).await?;
        if !response.success {
            return Err(ImagingError::Backend(
                response
                    .error
                    .unwrap_or_else(|| "volume request failed".to_string()),
            ));
        }
        let data = response
            .data
            .ok_or_else(|| ImagingError::Backend("response carried no volume data".into()))?;
        let [depth, height, width] = response
            .dimensions
            .ok_or_else(|| ImagingError::Backend("response carried no dimensions".into()))?;
        let volume = VolumeBuffer::from_base64(&data, (depth, height, width))?;
        Ok(match response.spacing {
            Some([x, y, z]) => volume.with_spacing((x as f32, y as f32, z as f32)),
            None => volume,
        })
    }
}
