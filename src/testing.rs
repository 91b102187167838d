//! Fakes shared by unit tests across modules.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use crate::artifact::{test_id, ArtifactId};
use crate::codec::{DecodeError, DecodeResult, ImageDecoder};
use crate::gallery::GalleryIndex;
use crate::storage::{ArtifactStore, MemoryArtifactStore, StoreResult};

pub(crate) const CORRUPT: &[u8] = b"corrupt";

/// Decoder whose handles count themselves while alive.
#[derive(Debug, Default)]
pub(crate) struct CountingDecoder {
    live: Arc<AtomicUsize>,
    decodes: AtomicUsize,
}

impl CountingDecoder {
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) struct CountedHandle {
    pub(crate) bytes: Vec<u8>,
    live: Arc<AtomicUsize>,
}

impl Drop for CountedHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ImageDecoder for CountingDecoder {
    type Output = CountedHandle;

    fn decode(&self, bytes: &[u8]) -> DecodeResult<CountedHandle> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if bytes == CORRUPT {
            return Err(DecodeError::CorruptData {
                message: "simulated corrupt artifact".to_string(),
            });
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(CountedHandle {
            bytes: bytes.to_vec(),
            live: self.live.clone(),
        })
    }
}

/// Memory store plus index holding `count` decodable artifacts.
pub(crate) fn seeded_gallery(count: usize) -> (Arc<MemoryArtifactStore>, Arc<GalleryIndex>) {
    let store = Arc::new(MemoryArtifactStore::new());
    let index = Arc::new(GalleryIndex::new());
    for _ in 0..count {
        add_artifact(&store, &index);
    }
    (store, index)
}

pub(crate) fn add_artifact(store: &MemoryArtifactStore, index: &GalleryIndex) -> ArtifactId {
    add_artifact_bytes(store, index, b"image")
}

pub(crate) fn add_artifact_bytes(
    store: &MemoryArtifactStore,
    index: &GalleryIndex,
    bytes: &[u8],
) -> ArtifactId {
    let id = store.put(bytes).expect("memory store put cannot fail");
    index.register(id.clone());
    id
}

/// An id that no store holds.
pub(crate) fn dangling_id() -> ArtifactId {
    test_id(u128::from(u64::MAX))
}

/// Store whose read of one artifact blocks until the test opens the gate.
pub(crate) struct GatedStore {
    inner: MemoryArtifactStore,
    gate: Mutex<Option<Gate>>,
}

struct Gate {
    id: ArtifactId,
    entered: mpsc::Sender<()>,
    open: mpsc::Receiver<()>,
}

/// Test side of a [`GatedStore`] gate.
pub(crate) struct GateHandle {
    entered: mpsc::Receiver<()>,
    open: mpsc::Sender<()>,
}

impl GateHandle {
    /// Blocks until a reader is parked on the gated artifact.
    pub(crate) fn wait_entered(&self) {
        self.entered.recv().expect("gated read should start");
    }

    pub(crate) fn open(&self) {
        let _ = self.open.send(());
    }
}

impl GatedStore {
    pub(crate) fn new(inner: MemoryArtifactStore) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
        }
    }

    /// Gates the next read of `id`.
    pub(crate) fn gate(&self, id: &ArtifactId) -> GateHandle {
        let (entered_tx, entered) = mpsc::channel();
        let (open, open_rx) = mpsc::channel();
        *self.gate.lock().unwrap() = Some(Gate {
            id: id.clone(),
            entered: entered_tx,
            open: open_rx,
        });
        GateHandle { entered, open }
    }
}

impl ArtifactStore for GatedStore {
    fn put(&self, bytes: &[u8]) -> StoreResult<ArtifactId> {
        self.inner.put(bytes)
    }

    fn get(&self, id: &ArtifactId) -> StoreResult<Vec<u8>> {
        let gate = {
            let mut gate = self.gate.lock().unwrap();
            if gate.as_ref().is_some_and(|pending| pending.id == *id) {
                gate.take()
            } else {
                None
            }
        };
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.open.recv();
        }
        self.inner.get(id)
    }

    fn list_all(&self) -> StoreResult<Vec<ArtifactId>> {
        self.inner.list_all()
    }
}
