use thiserror::Error;

use crate::lifecycle::LifecycleState;

pub type Result<T, E = PhotoboothError> = std::result::Result<T, E>;

/// Unified error type covering failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum PhotoboothError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("initialization error: {0}")]
    Initialization(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("upload error: {0}")]
    Upload(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error("camera system not initialized (state: {0})")]
    NotReady(LifecycleState),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PhotoboothError {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, PhotoboothError::NotReady(_))
    }
}
