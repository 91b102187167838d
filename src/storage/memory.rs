use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{ArtifactStore, StoreError, StoreResult};
use crate::artifact::{ArtifactId, IdMinter};

/// Volatile store for hosts without a writable filesystem.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    minter: IdMinter,
    artifacts: BTreeMap<ArtifactId, Vec<u8>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn len(&self) -> usize {
        self.inner().artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().artifacts.is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, bytes: &[u8]) -> StoreResult<ArtifactId> {
        let mut inner = self.inner();
        let id = inner.minter.mint()?;
        inner.artifacts.insert(id.clone(), bytes.to_vec());
        Ok(id)
    }

    fn get(&self, id: &ArtifactId) -> StoreResult<Vec<u8>> {
        self.inner()
            .artifacts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })
    }

    fn list_all(&self) -> StoreResult<Vec<ArtifactId>> {
        Ok(self.inner().artifacts.keys().cloned().collect())
    }
}
