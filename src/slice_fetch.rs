//! Debounced, per-viewport slice fetching.
//!
//! Each viewport owns one slot. Scheduling a request clears the slot's
//! pending debounce timer before arming a new one, so only the last request
//! of a burst reaches the backend. A slot never has more than one network
//! call outstanding: a timer that fires while a call is in flight parks its
//! request, and the newest parked request is issued when the call returns.
//! Responses are written to the [`SliceCache`] under their own key and
//! reported through [`FetchEvent`]s; whether they are displayed is decided by
//! the viewport comparing keys, never by completion order.

use crate::backend::ImagingBackend;
use crate::enums::Plane;
use crate::error::{ImagingError, Result};
use crate::slice_cache::{SliceCache, SliceImage, SliceRequest};

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewportId(pub u32);

impl From<Plane> for ViewportId {
    fn from(plane: Plane) -> Self {
        ViewportId(plane as u32)
    }
}

#[derive(Clone, Debug)]
pub enum FetchEvent {
    Loaded {
        viewport: ViewportId,
        request: SliceRequest,
        image: Arc<SliceImage>,
    },
    Failed {
        viewport: ViewportId,
        request: SliceRequest,
        message: String,
    },
}

impl FetchEvent {
    pub fn viewport(&self) -> ViewportId {
        match self {
            FetchEvent::Loaded { viewport, .. } | FetchEvent::Failed { viewport, .. } => *viewport,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheduled {
    /// Served from the cache, no timer armed
    Cached,
    /// Debounce timer armed
    Debouncing,
}

#[derive(Default)]
struct ViewportSlot {
    generation: u64,
    timer: Option<JoinHandle<()>>,
    in_flight: bool,
    parked: Option<SliceRequest>,
}

struct Shared<B> {
    backend: Arc<B>,
    cache: Arc<SliceCache>,
    slots: Mutex<HashMap<ViewportId, ViewportSlot>>,
    events: mpsc::UnboundedSender<FetchEvent>,
}

impl<B> Shared<B> {
    fn slots(&self) -> MutexGuard<'_, HashMap<ViewportId, ViewportSlot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: FetchEvent) {
        // Receiver gone means the viewer was torn down
        let _ = self.events.send(event);
    }

    fn emit_cached(&self, viewport: ViewportId, request: SliceRequest) -> bool {
        match self.cache.get(&request) {
            Some(image) => {
                self.emit(FetchEvent::Loaded {
                    viewport,
                    request,
                    image,
                });
                true
            }
            None => false,
        }
    }
}

pub struct SliceFetchController<B> {
    shared: Arc<Shared<B>>,
    debounce: Duration,
}

impl<B: ImagingBackend> SliceFetchController<B> {
    pub fn new(
        backend: Arc<B>,
        cache: Arc<SliceCache>,
        debounce: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<FetchEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            backend,
            cache,
            slots: Mutex::new(HashMap::new()),
            events,
        });
        (Self { shared, debounce }, receiver)
    }

    pub fn cache(&self) -> &Arc<SliceCache> {
        &self.shared.cache
    }

    /// Schedules `request` for `viewport`, superseding any pending timer or parked
    /// request of that viewport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, viewport: ViewportId, request: SliceRequest) -> Scheduled {
        let mut slots = self.shared.slots();
        let slot = slots.entry(viewport).or_default();
        slot.generation += 1;
        slot.parked = None;
        if let Some(timer) = slot.timer.take() {
            debug!("viewport {viewport:?}: superseding pending debounce timer");
            timer.abort();
        }

        if self.shared.emit_cached(viewport, request) {
            return Scheduled::Cached;
        }

        let generation = slot.generation;
        let shared = Arc::clone(&self.shared);
        let debounce = self.debounce;
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            Self::fire(shared, viewport, generation, request);
        }));
        Scheduled::Debouncing
    }

    /// Drops the pending timer and parked request of `viewport`. In-flight calls are left alone.
    pub fn cancel_pending(&self, viewport: ViewportId) {
        let mut slots = self.shared.slots();
        if let Some(slot) = slots.get_mut(&viewport) {
            slot.generation += 1;
            slot.parked = None;
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
        }
    }

    pub fn is_pending(&self, viewport: ViewportId) -> bool {
        let slots = self.shared.slots();
        slots
            .get(&viewport)
            .is_some_and(|slot| slot.timer.is_some() || slot.in_flight)
    }

    fn fire(shared: Arc<Shared<B>>, viewport: ViewportId, generation: u64, request: SliceRequest) {
        let mut slots = shared.slots();
        let slot = slots.entry(viewport).or_default();
        if slot.generation != generation {
            return;
        }
        slot.timer = None;

        if shared.emit_cached(viewport, request) {
            return;
        }
        if slot.in_flight {
            debug!("viewport {viewport:?}: call in flight, parking request");
            slot.parked = Some(request);
            return;
        }
        slot.in_flight = true;
        drop(slots);

        // Detached from the timer so that superseding a timer never cancels a call
        tokio::spawn(Self::run(shared, viewport, request));
    }

    async fn run(shared: Arc<Shared<B>>, viewport: ViewportId, first: SliceRequest) {
        let mut next = Some(first);
        while let Some(request) = next.take() {
            match Self::fetch(&shared, &request).await {
                Ok(image) => {
                    info!(
                        "viewport {viewport:?}: loaded {} slice {}/{}",
                        request.plane, image.current_slice, image.total_slices
                    );
                    let image = Arc::new(image);
                    shared.cache.put(request, Arc::clone(&image));
                    shared.emit(FetchEvent::Loaded {
                        viewport,
                        request,
                        image,
                    });
                }
                Err(err) => {
                    warn!("viewport {viewport:?}: slice fetch failed: {err}");
                    shared.emit(FetchEvent::Failed {
                        viewport,
                        request,
                        message: err.to_string(),
                    });
                }
            }

            let mut slots = shared.slots();
            let slot = slots.entry(viewport).or_default();
            if let Some(parked) = slot.parked.take() {
                if !shared.emit_cached(viewport, parked) {
                    next = Some(parked);
                }
            }
            if next.is_none() {
                slot.in_flight = false;
            }
            drop(slots);
        }
    }

    async fn fetch(shared: &Shared<B>, request: &SliceRequest) -> Result<SliceImage> {
        let response = shared.backend.process_slice(request).await?;
        if !response.success {
            return Err(ImagingError::Backend(
                response
                    .error
                    .unwrap_or_else(|| "processing failed".to_string()),
            ));
        }
        let payload = response
            .image
            .ok_or_else(|| ImagingError::Backend("response carried no image".into()))?;
        SliceImage::decode(
            &payload,
            response.total_slices.unwrap_or(1),
            response.current_slice.unwrap_or(request.slice_index),
        )
    }
}

impl<B> Drop for SliceFetchController<B> {
    fn drop(&mut self) {
        let mut slots = self.shared.slots.lock().unwrap_or_else(|e| e.into_inner());
        for slot in slots.values_mut() {
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
        }
    }
}
