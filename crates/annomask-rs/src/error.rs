//! Mask pipeline errors.

use thiserror::Error;

/// Error type returned by persistence and undo callbacks supplied by the caller.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("RLE covers {got} pixels, expected {expected}")]
    RleLengthMismatch { expected: u64, got: u64 },
    #[error("mask size mismatch: expected {expected} pixels, got {got}")]
    MaskSizeMismatch { expected: usize, got: usize },
    #[error("image encoding failed: {0}")]
    ImageEncode(#[from] image::ImageError),
    #[error("annotation update rejected: {0}")]
    UpdateRejected(#[source] BoxError),
    #[error("undo of '{description}' failed: {source}")]
    UndoFailed {
        description: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to read parameters: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid parameters: {0}")]
    Params(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MaskError>;
