use thiserror::Error;

/// Errors returned by cluster builder operations.
#[derive(Debug, Error)]
pub enum VecIdError {
    #[error("vecid: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("vecid: empty vector")]
    EmptyVector,
}
