use super::model::CapturePhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    Start,
    FrameCaptured,
    FrameEncoded,
    ArtifactPersisted,
    ArtifactRegistered,
    CooldownElapsed,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: CapturePhase,
    pub event: CaptureEvent,
    pub to: CapturePhase,
}

impl StateTransition {
    pub const fn new(from: CapturePhase, event: CaptureEvent, to: CapturePhase) -> Self {
        Self { from, event, to }
    }
}
