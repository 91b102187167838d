use std::sync::Arc;

use thiserror::Error;

use crate::artifact::ArtifactId;
use crate::codec::{DecodeError, ImageDecoder};
use crate::storage::{ArtifactStore, StoreError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read artifact: {0}")]
    Store(#[from] StoreError),
    #[error("failed to decode artifact: {0}")]
    Decode(#[from] DecodeError),
    #[error("artifact load task stopped unexpectedly")]
    Interrupted,
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Reads and decodes one artifact off the async executor.
pub(crate) async fn fetch_decoded<D: ImageDecoder>(
    store: Arc<dyn ArtifactStore>,
    decoder: Arc<D>,
    id: ArtifactId,
) -> LoadResult<D::Output> {
    tokio::task::spawn_blocking(move || -> LoadResult<D::Output> {
        let bytes = store.get(&id)?;
        Ok(decoder.decode(&bytes)?)
    })
    .await
    .unwrap_or(Err(LoadError::Interrupted))
}
