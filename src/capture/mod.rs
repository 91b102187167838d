use thiserror::Error;

use crate::codec::{EncodeError, RawFrame};
use crate::storage::StoreError;

mod pipeline;

pub use pipeline::{CapturePipeline, CaptureTicket, DEFAULT_COOLDOWN};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("no rendered frame available: {message}")]
    Unavailable { message: String },
}

/// Reads back the most recently rendered frame.
pub trait FrameSource: Send + Sync {
    fn capture_frame(&self) -> Result<RawFrame, FrameError>;
}

/// Stage at which an admitted capture failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Capturing,
    Encoding,
    Persisting,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a capture is already in progress")]
    AlreadyInProgress,
    #[error("capture is cooling down")]
    CoolingDown,
    #[error("frame unavailable")]
    FrameUnavailable {
        #[source]
        source: FrameError,
    },
    #[error("frame encoding failed")]
    EncodeFailed {
        #[source]
        source: EncodeError,
    },
    #[error("artifact persist failed")]
    PersistFailed {
        #[source]
        source: StoreError,
    },
    #[error("capture task stopped before reporting a result")]
    Interrupted,
}

impl CaptureError {
    /// The failed stage, for captures that were admitted and then aborted.
    pub fn stage(&self) -> Option<CaptureStage> {
        match self {
            Self::FrameUnavailable { .. } => Some(CaptureStage::Capturing),
            Self::EncodeFailed { .. } => Some(CaptureStage::Encoding),
            Self::PersistFailed { .. } => Some(CaptureStage::Persisting),
            Self::AlreadyInProgress | Self::CoolingDown | Self::Interrupted => None,
        }
    }

    /// The call was dropped by the debounce policy without doing any work.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::AlreadyInProgress | Self::CoolingDown)
    }
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
