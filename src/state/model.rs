/// Stage of the single in-flight capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePhase {
    #[default]
    Idle,
    Capturing,
    Encoding,
    Persisting,
    Registering,
    CoolingDown,
}

impl CapturePhase {
    /// A capture is running and owns the pipeline.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Self::Capturing | Self::Encoding | Self::Persisting | Self::Registering
        )
    }
}
