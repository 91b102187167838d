//! Ordered, in-memory view of every stored artifact.
//!
//! [`GalleryIndex`] is the only mutable shared state of the gallery: a sorted
//! id sequence behind one mutex. Windows are materialized as [`Window`]
//! snapshots so readers never observe a partial insert, and every
//! slot-to-artifact lookup goes through [`Window::slot`].

use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use crate::artifact::ArtifactId;
use crate::storage::{ArtifactStore, StoreResult};

mod window;

pub use window::Window;

#[derive(Debug)]
pub struct GalleryIndex {
    ids: Mutex<Vec<ArtifactId>>,
    revision: watch::Sender<u64>,
}

impl GalleryIndex {
    pub fn new() -> Self {
        Self::from_sorted(Vec::new())
    }

    /// Rebuilds the index from a single store listing. A listing failure is
    /// returned as-is; the gallery must not start from a partial view.
    pub fn initialize<S: ArtifactStore + ?Sized>(store: &S) -> StoreResult<Self> {
        let mut ids = store.list_all()?;
        ids.sort_unstable();
        ids.dedup();
        tracing::info!(count = ids.len(), "gallery index initialized");
        Ok(Self::from_sorted(ids))
    }

    fn from_sorted(ids: Vec<ArtifactId>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            ids: Mutex::new(ids),
            revision,
        }
    }

    fn ids(&self) -> MutexGuard<'_, Vec<ArtifactId>> {
        self.ids.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Inserts `id` at its sorted position. Registering a known id is a no-op.
    /// Returns whether the index changed.
    pub fn register(&self, id: ArtifactId) -> bool {
        let mut ids = self.ids();
        // Fast path: captures normally arrive newest-last.
        let position = match ids.last() {
            Some(last) if *last < id => ids.len(),
            None => 0,
            _ => match ids.binary_search(&id) {
                Ok(_) => {
                    tracing::debug!(id = %id, "artifact already registered");
                    return false;
                }
                Err(position) => position,
            },
        };

        if position != ids.len() {
            tracing::debug!(id = %id, position, "registered artifact out of order");
        }
        ids.insert(position, id);
        drop(ids);

        self.revision.send_modify(|revision| *revision += 1);
        true
    }

    /// The last `min(k, len)` ids, ascending.
    pub fn window(&self, k: usize) -> Window {
        let ids = self.ids();
        let start = ids.len().saturating_sub(k);
        Window::new(ids[start..].to_vec(), k)
    }

    /// The artifact displayed at `slot` of a `k`-wide window; slot 0 is the
    /// newest capture.
    pub fn slot_to_artifact(&self, slot: usize, k: usize) -> Option<ArtifactId> {
        self.window(k).slot(slot).cloned()
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.ids().binary_search(id).is_ok()
    }

    /// Bumped once per successful [`register`](Self::register).
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

impl Default for GalleryIndex {
    fn default() -> Self {
        Self::new()
    }
}
