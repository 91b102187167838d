use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::watch;

use crate::artifact::ArtifactId;
use crate::codec::ImageDecoder;
use crate::gallery::GalleryIndex;
use crate::slots::{fetch_decoded, LoadError};
use crate::storage::ArtifactStore;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to open {id} in the viewer: {source}")]
    Load {
        id: ArtifactId,
        #[source]
        source: LoadError,
    },
    #[error("viewer is closed")]
    Closed,
}

pub type ViewerResult<T> = std::result::Result<T, ViewerError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowOutcome {
    Shown(ArtifactId),
    /// The slot holds no artifact; the panel was left untouched.
    EmptySlot,
    /// A later `show` or `hide` took over before this load finished.
    Superseded,
}

/// The single full-resolution image on display.
#[derive(Debug)]
pub struct ViewerResource<H> {
    artifact: ArtifactId,
    handle: H,
}

impl<H> ViewerResource<H> {
    pub fn artifact(&self) -> &ArtifactId {
        &self.artifact
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

impl<H> Drop for ViewerResource<H> {
    fn drop(&mut self) {
        tracing::trace!(id = %self.artifact, "released viewer resource");
    }
}

#[derive(Debug)]
struct ViewerState<H> {
    closed: bool,
    generation: u64,
    resource: Option<ViewerResource<H>>,
}

pub struct Viewer<D: ImageDecoder> {
    store: Arc<dyn ArtifactStore>,
    index: Arc<GalleryIndex>,
    decoder: Arc<D>,
    state: Mutex<ViewerState<D::Output>>,
    visible: watch::Sender<bool>,
}

impl<D: ImageDecoder> Viewer<D> {
    pub fn new(store: Arc<dyn ArtifactStore>, index: Arc<GalleryIndex>, decoder: D) -> Self {
        let (visible, _) = watch::channel(false);
        Self {
            store,
            index,
            decoder: Arc::new(decoder),
            state: Mutex::new(ViewerState {
                closed: false,
                generation: 0,
                resource: None,
            }),
            visible,
        }
    }

    fn state(&self) -> MutexGuard<'_, ViewerState<D::Output>> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn set_visible(&self, visible: bool) {
        self.visible.send_if_modified(|current| {
            let changed = *current != visible;
            *current = visible;
            changed
        });
    }

    /// Opens the artifact at `slot` of a `k`-wide window at full resolution,
    /// replacing whatever was shown before.
    pub async fn show(&self, slot: usize, k: usize) -> ViewerResult<ShowOutcome> {
        let Some(target) = self.index.slot_to_artifact(slot, k) else {
            tracing::debug!(slot, k, "viewer ignored empty slot");
            return Ok(ShowOutcome::EmptySlot);
        };

        let generation = {
            let mut state = self.state();
            if state.closed {
                return Err(ViewerError::Closed);
            }
            state.generation += 1;
            state.resource = None;
            self.set_visible(false);
            state.generation
        };

        let loaded = fetch_decoded(self.store.clone(), self.decoder.clone(), target.clone()).await;

        let mut state = self.state();
        if state.closed || state.generation != generation {
            tracing::debug!(id = %target, "discarding superseded viewer load");
            return Ok(ShowOutcome::Superseded);
        }
        match loaded {
            Ok(handle) => {
                state.resource = Some(ViewerResource {
                    artifact: target.clone(),
                    handle,
                });
                self.set_visible(true);
                tracing::debug!(id = %target, slot, "viewer showing artifact");
                Ok(ShowOutcome::Shown(target))
            }
            Err(source) => {
                tracing::warn!(id = %target, slot, %source, "viewer failed to load artifact");
                Err(ViewerError::Load { id: target, source })
            }
        }
    }

    /// Hides the panel and releases the shown image. No-op when hidden.
    pub fn hide(&self) {
        let mut state = self.state();
        self.release(&mut state);
    }

    /// Hides for good; later `show` calls fail with [`ViewerError::Closed`].
    pub fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        self.release(&mut state);
        tracing::debug!("viewer closed");
    }

    /// Supersedes any in-flight `show` and drops the current image.
    fn release(&self, state: &mut ViewerState<D::Output>) {
        state.generation += 1;
        if let Some(resource) = state.resource.take() {
            tracing::debug!(id = %resource.artifact(), "viewer hidden");
        }
        self.set_visible(false);
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    pub fn subscribe_visibility(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }

    pub fn current_artifact(&self) -> Option<ArtifactId> {
        self.state()
            .resource
            .as_ref()
            .map(|resource| resource.artifact.clone())
    }

    pub fn with_resource<R>(
        &self,
        read: impl FnOnce(Option<&ViewerResource<D::Output>>) -> R,
    ) -> R {
        let state = self.state();
        read(state.resource.as_ref())
    }
}
