use crate::capture::CaptureError;
use crate::config::ConfigPathError;
use crate::storage::StoreError;
use crate::viewer::ViewerError;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigPathError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Viewer(#[from] ViewerError),
}
