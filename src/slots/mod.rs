//! Per-slot thumbnails for the current gallery window.
//!
//! Each slot owns at most one [`SlotResource`]. Retargeting a slot drops its
//! resource under the slot table lock, so readers going through
//! [`SlotLoader::with_slot`] never see a released handle. Loads run
//! concurrently and are only assigned if the slot still targets the same
//! artifact when they finish.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinSet;

use crate::artifact::ArtifactId;
use crate::codec::ImageDecoder;
use crate::gallery::GalleryIndex;
use crate::storage::ArtifactStore;

mod load;

pub(crate) use load::fetch_decoded;
pub use load::{LoadError, LoadResult};

/// Decoded thumbnail bound to one slot. Dropping it frees the handle.
#[derive(Debug)]
pub struct SlotResource<H> {
    artifact: ArtifactId,
    handle: H,
}

impl<H> SlotResource<H> {
    pub fn artifact(&self) -> &ArtifactId {
        &self.artifact
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

impl<H> Drop for SlotResource<H> {
    fn drop(&mut self) {
        tracing::trace!(id = %self.artifact, "released slot resource");
    }
}

#[derive(Debug)]
struct SlotState<H> {
    target: Option<ArtifactId>,
    generation: u64,
    resource: Option<SlotResource<H>>,
}

impl<H> Default for SlotState<H> {
    fn default() -> Self {
        Self {
            target: None,
            generation: 0,
            resource: None,
        }
    }
}

#[derive(Debug)]
struct SlotTable<H> {
    closed: bool,
    slots: Vec<SlotState<H>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadOutcome {
    Assigned,
    Superseded,
    Failed,
}

/// Work done by one [`SlotLoader::refresh`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    /// Slots whose target changed.
    pub retargeted: usize,
    /// Resources dropped because their slot changed target or was removed.
    pub released: usize,
    pub loaded: usize,
    pub failed: usize,
    /// Loads discarded because their slot moved on before they finished.
    pub superseded: usize,
}

struct PendingLoad {
    slot: usize,
    generation: u64,
    artifact: ArtifactId,
}

pub struct SlotLoader<D: ImageDecoder> {
    store: Arc<dyn ArtifactStore>,
    index: Arc<GalleryIndex>,
    decoder: Arc<D>,
    table: Arc<Mutex<SlotTable<D::Output>>>,
}

impl<D: ImageDecoder> Clone for SlotLoader<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            index: self.index.clone(),
            decoder: self.decoder.clone(),
            table: self.table.clone(),
        }
    }
}

impl<D: ImageDecoder> SlotLoader<D> {
    pub fn new(store: Arc<dyn ArtifactStore>, index: Arc<GalleryIndex>, decoder: D) -> Self {
        Self {
            store,
            index,
            decoder: Arc::new(decoder),
            table: Arc::new(Mutex::new(SlotTable {
                closed: false,
                slots: Vec::new(),
            })),
        }
    }

    fn table(&self) -> MutexGuard<'_, SlotTable<D::Output>> {
        lock_table(&self.table)
    }

    /// Rebinds slots `0..k` to the current window and waits for the loads
    /// that this call started. Slots whose target is unchanged are left alone.
    pub async fn refresh(&self, k: usize) -> RefreshReport {
        let mut report = RefreshReport::default();
        let pending = self.retarget(k, &mut report);

        let mut loads = JoinSet::new();
        for load in pending {
            let loader = self.clone();
            loads.spawn(async move { loader.load_slot(load).await });
        }
        while let Some(joined) = loads.join_next().await {
            match joined {
                Ok(LoadOutcome::Assigned) => report.loaded += 1,
                Ok(LoadOutcome::Superseded) => report.superseded += 1,
                Ok(LoadOutcome::Failed) => report.failed += 1,
                Err(err) => {
                    tracing::warn!(?err, "slot load task failed");
                    report.failed += 1;
                }
            }
        }

        if report != RefreshReport::default() {
            tracing::debug!(?report, k, "slot refresh finished");
        }
        report
    }

    /// The window is read while the table is locked, so the last retarget
    /// to run always binds the newest window. Lock order: table, then index.
    fn retarget(&self, k: usize, report: &mut RefreshReport) -> Vec<PendingLoad> {
        let mut table = self.table();
        if table.closed {
            return Vec::new();
        }

        let window = self.index.window(k);
        let k = window.capacity();
        if table.slots.len() > k {
            report.released += table
                .slots
                .drain(k..)
                .filter(|slot| slot.resource.is_some())
                .count();
        }
        table.slots.resize_with(k, SlotState::default);

        let mut pending = Vec::new();
        for (slot, (state, target)) in table.slots.iter_mut().zip(window.slots()).enumerate() {
            if state.target.as_ref() == target {
                continue;
            }
            report.retargeted += 1;
            if state.resource.take().is_some() {
                report.released += 1;
            }
            state.generation += 1;
            state.target = target.cloned();
            if let Some(artifact) = target {
                pending.push(PendingLoad {
                    slot,
                    generation: state.generation,
                    artifact: artifact.clone(),
                });
            }
        }
        pending
    }

    async fn load_slot(&self, load: PendingLoad) -> LoadOutcome {
        let loaded = fetch_decoded(
            self.store.clone(),
            self.decoder.clone(),
            load.artifact.clone(),
        )
        .await;

        let mut table = self.table();
        let current = !table.closed
            && table
                .slots
                .get(load.slot)
                .is_some_and(|state| state.generation == load.generation);
        if !current {
            tracing::debug!(
                slot = load.slot,
                id = %load.artifact,
                "discarding load for superseded slot target"
            );
            return LoadOutcome::Superseded;
        }

        match loaded {
            Ok(handle) => {
                if let Some(state) = table.slots.get_mut(load.slot) {
                    state.resource = Some(SlotResource {
                        artifact: load.artifact,
                        handle,
                    });
                }
                LoadOutcome::Assigned
            }
            Err(err) => {
                tracing::warn!(
                    slot = load.slot,
                    id = %load.artifact,
                    %err,
                    "slot load failed; showing placeholder"
                );
                LoadOutcome::Failed
            }
        }
    }

    /// Runs `read` against the slot's current resource; `None` means the
    /// slot shows a placeholder.
    pub fn with_slot<R>(
        &self,
        slot: usize,
        read: impl FnOnce(Option<&SlotResource<D::Output>>) -> R,
    ) -> R {
        let table = self.table();
        read(table.slots.get(slot).and_then(|state| state.resource.as_ref()))
    }

    /// The artifact the slot is bound to, loaded or not.
    pub fn slot_target(&self, slot: usize) -> Option<ArtifactId> {
        self.table().slots.get(slot).and_then(|state| state.target.clone())
    }

    pub fn slot_count(&self) -> usize {
        self.table().slots.len()
    }

    pub fn live_resources(&self) -> usize {
        self.table()
            .slots
            .iter()
            .filter(|state| state.resource.is_some())
            .count()
    }

    /// Releases every slot resource. Loads still in flight are discarded and
    /// later refreshes do nothing.
    pub fn close(&self) {
        let mut table = self.table();
        table.closed = true;
        let released = table
            .slots
            .drain(..)
            .filter(|state| state.resource.is_some())
            .count();
        tracing::debug!(released, "slot loader closed");
    }

    pub fn is_closed(&self) -> bool {
        self.table().closed
    }
}

fn lock_table<H>(table: &Mutex<SlotTable<H>>) -> MutexGuard<'_, SlotTable<H>> {
    table.lock().unwrap_or_else(|err| err.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryArtifactStore;
    use crate::testing::{
        add_artifact, add_artifact_bytes, dangling_id, seeded_gallery, CountingDecoder, GatedStore,
        CORRUPT,
    };
    use std::time::Duration;

    fn loader(
        store: Arc<MemoryArtifactStore>,
        index: Arc<GalleryIndex>,
    ) -> SlotLoader<CountingDecoder> {
        SlotLoader::new(store, index, CountingDecoder::default())
    }

    fn bound_artifacts(loader: &SlotLoader<CountingDecoder>, k: usize) -> Vec<Option<ArtifactId>> {
        (0..k)
            .map(|slot| loader.with_slot(slot, |resource| resource.map(|r| r.artifact().clone())))
            .collect()
    }

    #[tokio::test]
    async fn refresh_binds_each_slot_to_its_window_target() {
        let (store, index) = seeded_gallery(3);
        let loader = loader(store, index.clone());

        let report = loader.refresh(4).await;

        let expected: Vec<_> = (0..4).map(|slot| index.slot_to_artifact(slot, 4)).collect();
        assert_eq!(bound_artifacts(&loader, 4), expected);
        assert_eq!(expected[3], None);
        assert_eq!(report.loaded, 3);
        assert_eq!(loader.decoder.live(), 3);
    }

    #[tokio::test]
    async fn second_refresh_without_registration_does_no_work() {
        let (store, index) = seeded_gallery(5);
        let loader = loader(store, index);
        loader.refresh(4).await;
        let decodes = loader.decoder.decodes();

        let report = loader.refresh(4).await;

        assert_eq!(report, RefreshReport::default());
        assert_eq!(loader.decoder.decodes(), decodes);
    }

    #[tokio::test]
    async fn new_capture_shifts_slots_and_keeps_one_resource_per_slot() {
        let k = 4;
        let (store, index) = seeded_gallery(k);
        let loader = loader(store.clone(), index.clone());
        loader.refresh(k).await;

        for _ in 0..6 {
            let before = bound_artifacts(&loader, k);
            let newest = add_artifact(&store, &index);

            let report = loader.refresh(k).await;
            let after = bound_artifacts(&loader, k);

            assert_eq!(after[0], Some(newest));
            assert_eq!(&after[1..], &before[..k - 1]);
            assert_eq!(report.retargeted, k);
            assert_eq!(report.released, k);
            assert_eq!(loader.decoder.live(), k);
            assert_eq!(loader.live_resources(), k);
        }
    }

    #[tokio::test]
    async fn failed_slot_falls_back_to_placeholder_without_stopping_others() {
        let (store, index) = seeded_gallery(2);
        let corrupt = add_artifact_bytes(&store, &index, CORRUPT);
        add_artifact(&store, &index);
        let loader = loader(store, index.clone());

        let report = loader.refresh(4).await;

        assert_eq!(index.slot_to_artifact(1, 4), Some(corrupt.clone()));
        assert_eq!(report.failed, 1);
        assert_eq!(report.loaded, 3);
        assert_eq!(loader.slot_target(1), Some(corrupt));
        assert!(loader.with_slot(1, |resource| resource.is_none()));
        assert!(loader.with_slot(0, |resource| resource.is_some()));
    }

    #[tokio::test]
    async fn missing_artifact_is_a_local_failure() {
        let (store, index) = seeded_gallery(1);
        index.register(dangling_id());
        let loader = loader(store, index);

        let report = loader.refresh(2).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.loaded, 1);
        assert_eq!(loader.live_resources(), 1);
    }

    #[tokio::test]
    async fn shrinking_the_window_releases_trailing_slots() {
        let (store, index) = seeded_gallery(6);
        let loader = loader(store, index);
        loader.refresh(6).await;

        let report = loader.refresh(2).await;

        assert_eq!(report.released, 4);
        assert_eq!(loader.slot_count(), 2);
        assert_eq!(loader.decoder.live(), 2);
    }

    #[tokio::test]
    async fn close_releases_everything_and_stops_refreshing() {
        let (store, index) = seeded_gallery(3);
        let loader = loader(store.clone(), index.clone());
        loader.refresh(3).await;

        loader.close();
        add_artifact(&store, &index);
        let report = loader.refresh(3).await;

        assert!(loader.is_closed());
        assert_eq!(report, RefreshReport::default());
        assert_eq!(loader.decoder.live(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stale_load_for_superseded_target_is_discarded() {
        let inner = MemoryArtifactStore::new();
        let index = Arc::new(GalleryIndex::new());
        let first = add_artifact(&inner, &index);
        let store = Arc::new(GatedStore::new(inner));
        let gate = store.gate(&first);
        let loader = SlotLoader::new(store.clone(), index.clone(), CountingDecoder::default());

        let slow = tokio::spawn({
            let loader = loader.clone();
            async move { loader.refresh(1).await }
        });
        gate.wait_entered();

        let second = store.put(b"image").unwrap();
        index.register(second.clone());
        let fast = loader.refresh(1).await;
        gate.open();
        let slow = slow.await.unwrap();

        assert_eq!(fast.loaded, 1);
        assert_eq!(slow.superseded, 1);
        assert_eq!(bound_artifacts(&loader, 1), vec![Some(second)]);
        assert_eq!(loader.decoder.live(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overlapping_refreshes_settle_on_the_newest_window() {
        let k = 2;
        let (store, index) = seeded_gallery(k);
        let loader = loader(store.clone(), index.clone());
        loader.refresh(k).await;

        // The first refresh queues on the table lock while a capture lands.
        let (newest, first) = loader.with_slot(0, |_| {
            let first = tokio::spawn({
                let loader = loader.clone();
                async move { loader.refresh(k).await }
            });
            std::thread::sleep(Duration::from_millis(50));
            (add_artifact(&store, &index), first)
        });
        loader.refresh(k).await;
        first.await.unwrap();

        let expected: Vec<_> = (0..k).map(|slot| index.slot_to_artifact(slot, k)).collect();
        assert_eq!(expected[0], Some(newest.clone()));
        assert_eq!(loader.slot_target(0), Some(newest));
        assert_eq!(bound_artifacts(&loader, k), expected);
        assert_eq!(loader.decoder.live(), k);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_during_inflight_load_assigns_nothing() {
        let inner = MemoryArtifactStore::new();
        let index = Arc::new(GalleryIndex::new());
        let first = add_artifact(&inner, &index);
        let store = Arc::new(GatedStore::new(inner));
        let gate = store.gate(&first);
        let loader = SlotLoader::new(store, index, CountingDecoder::default());

        let pending = tokio::spawn({
            let loader = loader.clone();
            async move { loader.refresh(1).await }
        });
        gate.wait_entered();
        loader.close();
        gate.open();
        let report = pending.await.unwrap();

        assert_eq!(report.superseded, 1);
        assert_eq!(report.loaded, 0);
        assert_eq!(loader.live_resources(), 0);
        assert_eq!(loader.decoder.live(), 0);
    }
}
