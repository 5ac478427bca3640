//! Error types for volume primitives and samplers.

use thiserror::Error;

/// Errors raised by the core volume and operator types.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Buffer or volume shapes do not agree.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A shape that cannot describe a volume (e.g. a zero extent).
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// The deformation operator has no inverse.
    #[error("Deformation operator is not invertible")]
    NonInvertibleOperator,

    /// The tensor backend failed to produce host data.
    #[error("Tensor backend error: {0}")]
    Backend(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an invalid shape error.
    pub fn invalid_shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }

    /// Create a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
