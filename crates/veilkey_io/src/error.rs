use crate::handle::ArtifactKind;
use thiserror::Error;
use veilkey_core::StegoError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("{0} artifacts cannot be downloaded")]
    NotDownloadable(ArtifactKind),

    #[error(transparent)]
    Write(#[from] StegoError),
}

pub type Result<T> = std::result::Result<T, StorageError>;
