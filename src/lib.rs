pub mod app;
pub mod artifact;
pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod gallery;
pub mod logging;
pub mod slots;
pub mod state;
pub mod storage;
pub mod viewer;

#[cfg(test)]
mod testing;

pub use app::{Gallery, GalleryOptions};
pub use artifact::ArtifactId;
pub use error::{AppError, AppResult};

use crate::gallery::GalleryIndex;
use crate::storage::FsArtifactStore;

/// Lists the current gallery window, newest first.
pub fn run() -> AppResult<Vec<ArtifactId>> {
    logging::init();
    tracing::info!("starting snapgallery");

    let config = config::load_gallery_config();
    let store = FsArtifactStore::open(config.storage_dir()?)?;
    let index = GalleryIndex::initialize(&store)?;
    let window = index.window(config.window_size());

    tracing::info!(
        root = %store.root().display(),
        stored = index.len(),
        shown = window.len(),
        "gallery loaded"
    );
    Ok(window.slots().flatten().cloned().collect())
}
