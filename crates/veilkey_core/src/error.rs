use crate::types::Shape;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StegoError {
    #[error("Failed to load image {origin}: {reason}")]
    ImageLoad { origin: String, reason: String },

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: Shape, actual: Shape },

    #[error("Invalid key file: {0}")]
    KeyFormat(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid image shape: {0}")]
    InvalidDimensions(Shape),

    #[error("Image encoding failed: {0}")]
    ImageEncode(String),

    #[error("Output {0} is the cover image; the cover is never overwritten")]
    OutputIsCover(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StegoError {
    pub(crate) fn image_load(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::ImageLoad {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StegoError>;
