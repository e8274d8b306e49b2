use quickclip_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("clipboard read refused")]
    PermissionDenied,
    #[error("store write of {size} bytes exceeds quota of {max}")]
    QuotaExceeded { size: usize, max: usize },
    #[error("context is no longer valid")]
    InvalidContext,
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
