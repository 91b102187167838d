//! Entry points used by input and UI collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::capture::{CapturePipeline, CaptureResult, CaptureTicket, FrameSource};
use crate::codec::{FrameEncoder, FullImageDecoder, ImageDecoder, PngCodec, ThumbnailDecoder};
use crate::config::GalleryConfig;
use crate::error::AppResult;
use crate::gallery::{GalleryIndex, Window};
use crate::slots::{RefreshReport, SlotLoader};
use crate::storage::{ArtifactStore, FsArtifactStore, StoreResult};
use crate::viewer::{ShowOutcome, Viewer, ViewerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GalleryOptions {
    pub window_size: usize,
    pub cooldown: Duration,
}

impl From<&GalleryConfig> for GalleryOptions {
    fn from(config: &GalleryConfig) -> Self {
        Self {
            window_size: config.window_size(),
            cooldown: config.cooldown(),
        }
    }
}

/// Capture pipeline, slot thumbnails and viewer wired to one store.
///
/// Constructors spawn a background task that refreshes the slots after
/// every registration while the panel is open, so they must run inside a
/// tokio runtime.
pub struct Gallery<T: ImageDecoder = ThumbnailDecoder, V: ImageDecoder = FullImageDecoder> {
    index: Arc<GalleryIndex>,
    pipeline: CapturePipeline,
    slots: SlotLoader<T>,
    viewer: Viewer<V>,
    frame_source: Arc<dyn FrameSource>,
    encoder: Arc<dyn FrameEncoder>,
    window_size: usize,
    panel_open: Arc<AtomicBool>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl Gallery {
    /// Opens the on-disk gallery described by `config`. Fails if the storage
    /// directory cannot be listed.
    pub fn open(config: &GalleryConfig, frame_source: Arc<dyn FrameSource>) -> AppResult<Self> {
        let store = FsArtifactStore::open(config.storage_dir()?)?;
        tracing::info!(root = %store.root().display(), "opening gallery");
        Ok(Self::with_store(
            Arc::new(store),
            frame_source,
            Arc::new(PngCodec),
            ThumbnailDecoder::new(config.thumbnail_max_edge()),
            FullImageDecoder,
            GalleryOptions::from(config),
        )?)
    }
}

impl<T: ImageDecoder, V: ImageDecoder> Gallery<T, V> {
    pub fn with_store(
        store: Arc<dyn ArtifactStore>,
        frame_source: Arc<dyn FrameSource>,
        encoder: Arc<dyn FrameEncoder>,
        thumbnails: T,
        full_size: V,
        options: GalleryOptions,
    ) -> StoreResult<Self> {
        let index = Arc::new(GalleryIndex::initialize(store.as_ref())?);
        let window_size = options.window_size.max(1);
        let slots = SlotLoader::new(store.clone(), index.clone(), thumbnails);
        let panel_open = Arc::new(AtomicBool::new(false));
        let refresher = spawn_refresher(&index, slots.clone(), panel_open.clone(), window_size);

        Ok(Self {
            pipeline: CapturePipeline::new(store.clone(), index.clone(), options.cooldown),
            viewer: Viewer::new(store, index.clone(), full_size),
            index,
            slots,
            frame_source,
            encoder,
            window_size,
            panel_open,
            refresher: Mutex::new(Some(refresher)),
        })
    }

    /// Starts a capture; rejected while one is running or cooling down.
    pub fn trigger_capture(&self) -> CaptureResult<CaptureTicket> {
        self.pipeline
            .spawn_capture(self.frame_source.clone(), self.encoder.clone())
    }

    /// Flips panel visibility and returns the new state. Opening refreshes
    /// the slots before returning.
    pub async fn toggle_gallery_panel(&self) -> bool {
        let open = !self.panel_open.fetch_xor(true, Ordering::SeqCst);
        tracing::debug!(open, "gallery panel toggled");
        if open {
            self.slots.refresh(self.window_size).await;
        }
        open
    }

    pub async fn refresh(&self) -> RefreshReport {
        self.slots.refresh(self.window_size).await
    }

    pub async fn select_slot(&self, slot: usize) -> ViewerResult<ShowOutcome> {
        self.viewer.show(slot, self.window_size).await
    }

    pub fn close_viewer(&self) {
        self.viewer.hide();
    }

    pub fn window(&self) -> Window {
        self.index.window(self.window_size)
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open.load(Ordering::SeqCst)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn index(&self) -> &GalleryIndex {
        &self.index
    }

    pub fn pipeline(&self) -> &CapturePipeline {
        &self.pipeline
    }

    pub fn slots(&self) -> &SlotLoader<T> {
        &self.slots
    }

    pub fn viewer(&self) -> &Viewer<V> {
        &self.viewer
    }

    /// Stops background refreshes and releases every decoded image. Loads
    /// still in flight finish without assigning anything.
    pub fn shutdown(&self) {
        let refresher = self
            .refresher
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        if let Some(refresher) = refresher {
            refresher.abort();
        }
        self.panel_open.store(false, Ordering::SeqCst);
        self.slots.close();
        self.viewer.close();
        tracing::info!("gallery shut down");
    }
}

impl<T: ImageDecoder, V: ImageDecoder> Drop for Gallery<T, V> {
    fn drop(&mut self) {
        let refresher = self
            .refresher
            .get_mut()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        if let Some(refresher) = refresher {
            refresher.abort();
        }
    }
}

fn spawn_refresher<T: ImageDecoder>(
    index: &GalleryIndex,
    slots: SlotLoader<T>,
    panel_open: Arc<AtomicBool>,
    window_size: usize,
) -> JoinHandle<()> {
    let mut revisions = index.subscribe();
    tokio::spawn(async move {
        while revisions.changed().await.is_ok() {
            if panel_open.load(Ordering::SeqCst) {
                slots.refresh(window_size).await;
            }
        }
    })
}
