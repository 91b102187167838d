use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;

use super::{CaptureError, CaptureResult, FrameSource};
use crate::artifact::ArtifactId;
use crate::codec::FrameEncoder;
use crate::gallery::GalleryIndex;
use crate::state::{CaptureEvent, CapturePhase, StateMachine};
use crate::storage::ArtifactStore;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

/// Debounced capture: frame, encode, persist, register, then cool down.
///
/// At most one capture runs at a time. Calls made while a capture is in
/// flight or cooling down are rejected, never queued.
#[derive(Clone)]
pub struct CapturePipeline {
    store: Arc<dyn ArtifactStore>,
    index: Arc<GalleryIndex>,
    machine: Arc<Mutex<StateMachine>>,
    cooldown: Duration,
}

/// Resolves with the registered id as soon as the artifact is indexed; the
/// cooldown continues in the background.
#[derive(Debug)]
pub struct CaptureTicket {
    result: oneshot::Receiver<CaptureResult<ArtifactId>>,
}

impl CaptureTicket {
    pub async fn wait(self) -> CaptureResult<ArtifactId> {
        self.result.await.unwrap_or(Err(CaptureError::Interrupted))
    }
}

impl CapturePipeline {
    pub fn new(store: Arc<dyn ArtifactStore>, index: Arc<GalleryIndex>, cooldown: Duration) -> Self {
        Self {
            store,
            index,
            machine: Arc::new(Mutex::new(StateMachine::new())),
            cooldown,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        lock_machine(&self.machine).state()
    }

    pub fn is_cooling_down(&self) -> bool {
        self.phase() == CapturePhase::CoolingDown
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Runs one capture and returns its id once registered.
    pub async fn capture(
        &self,
        frame_source: Arc<dyn FrameSource>,
        encoder: Arc<dyn FrameEncoder>,
    ) -> CaptureResult<ArtifactId> {
        self.spawn_capture(frame_source, encoder)?.wait().await
    }

    /// Admits a capture and runs it on a background task. Rejections are
    /// returned immediately. Must be called inside a tokio runtime.
    pub fn spawn_capture(
        &self,
        frame_source: Arc<dyn FrameSource>,
        encoder: Arc<dyn FrameEncoder>,
    ) -> CaptureResult<CaptureTicket> {
        self.admit()?;
        let (sender, result) = oneshot::channel();
        let pipeline = self.clone();
        tokio::spawn(async move {
            let in_flight = InFlight {
                machine: pipeline.machine.clone(),
            };
            pipeline.run(frame_source, encoder, sender).await;
            drop(in_flight);
        });
        Ok(CaptureTicket { result })
    }

    fn admit(&self) -> CaptureResult<()> {
        let mut machine = lock_machine(&self.machine);
        let phase = machine.state();
        if phase == CapturePhase::CoolingDown {
            tracing::debug!("capture rejected during cooldown");
            return Err(CaptureError::CoolingDown);
        }
        if phase.is_busy() {
            tracing::debug!(?phase, "capture rejected while another is in flight");
            return Err(CaptureError::AlreadyInProgress);
        }
        machine
            .transition(CaptureEvent::Start)
            .map_err(|_| CaptureError::AlreadyInProgress)?;
        Ok(())
    }

    async fn run(
        &self,
        frame_source: Arc<dyn FrameSource>,
        encoder: Arc<dyn FrameEncoder>,
        sender: oneshot::Sender<CaptureResult<ArtifactId>>,
    ) {
        match self.persist_and_register(frame_source, encoder).await {
            Ok(id) => {
                let _ = sender.send(Ok(id));
                tokio::time::sleep(self.cooldown).await;
                self.advance(CaptureEvent::CooldownElapsed);
                tracing::debug!("capture cooldown elapsed");
            }
            Err(err) => {
                self.advance(CaptureEvent::Abort);
                tracing::warn!(stage = ?err.stage(), %err, "capture aborted");
                let _ = sender.send(Err(err));
            }
        }
    }

    async fn persist_and_register(
        &self,
        frame_source: Arc<dyn FrameSource>,
        encoder: Arc<dyn FrameEncoder>,
    ) -> CaptureResult<ArtifactId> {
        // Let the frame being rendered complete before reading it back.
        tokio::task::yield_now().await;
        let pipeline = self.clone();
        let id = tokio::task::spawn_blocking(move || {
            pipeline.capture_encode_persist(frame_source.as_ref(), encoder.as_ref())
        })
        .await
        .unwrap_or(Err(CaptureError::Interrupted))?;

        self.index.register(id.clone());
        self.advance(CaptureEvent::ArtifactRegistered);
        tracing::info!(id = %id, "capture registered");
        Ok(id)
    }

    /// Blocking stages, run on the blocking pool.
    fn capture_encode_persist(
        &self,
        frame_source: &dyn FrameSource,
        encoder: &dyn FrameEncoder,
    ) -> CaptureResult<ArtifactId> {
        let frame = frame_source
            .capture_frame()
            .map_err(|source| CaptureError::FrameUnavailable { source })?;
        self.advance(CaptureEvent::FrameCaptured);

        let bytes = encoder
            .encode(&frame)
            .map_err(|source| CaptureError::EncodeFailed { source })?;
        drop(frame);
        self.advance(CaptureEvent::FrameEncoded);

        let id = self
            .store
            .put(&bytes)
            .map_err(|source| CaptureError::PersistFailed { source })?;
        self.advance(CaptureEvent::ArtifactPersisted);
        Ok(id)
    }

    fn advance(&self, event: CaptureEvent) {
        if let Err(err) = lock_machine(&self.machine).transition(event) {
            tracing::error!(%err, "capture state machine out of sync");
        }
    }
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("phase", &self.phase())
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

fn lock_machine(machine: &Mutex<StateMachine>) -> MutexGuard<'_, StateMachine> {
    machine.lock().unwrap_or_else(|err| err.into_inner())
}

/// Returns the pipeline to `Idle` if the capture task is dropped mid-flight,
/// e.g. on runtime shutdown.
struct InFlight {
    machine: Arc<Mutex<StateMachine>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut machine = lock_machine(&self.machine);
        let event = match machine.state() {
            CapturePhase::CoolingDown => CaptureEvent::CooldownElapsed,
            phase if phase.is_busy() && machine.can_transition(CaptureEvent::Abort) => {
                CaptureEvent::Abort
            }
            _ => return,
        };
        tracing::debug!(phase = ?machine.state(), "capture task dropped; resetting");
        let _ = machine.transition(event);
    }
}
