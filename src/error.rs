//! Error types for the gradient computation.
//!
//! Every error is a caller programming error: the computation is pure and
//! deterministic, so nothing here is worth retrying. Validation always runs
//! before any output buffer is written.

use thiserror::Error;

/// Errors produced while validating or running the batch-norm backward pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BnError {
    /// A tensor has the wrong rank, or a per-channel vector has the wrong length.
    #[error("shape mismatch for `{tensor}`: expected {expected}, got {got}")]
    ShapeMismatch {
        tensor: &'static str,
        expected: String,
        got: String,
    },

    /// The layout tag is neither channel-major nor channel-minor.
    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),

    /// A saved inverse standard deviation is not strictly positive.
    #[error("saved inverse std for channel {channel} must be positive, got {value}")]
    InvalidStatistics { channel: usize, value: f32 },
}

impl BnError {
    pub(crate) fn shape(tensor: &'static str, expected: impl ToString, got: impl ToString) -> Self {
        Self::ShapeMismatch {
            tensor,
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, BnError>;
