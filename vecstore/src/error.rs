use thiserror::Error;

#[derive(Error, Debug)]
pub enum VecError {
    #[error("vecstore: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    /// The index could not be reached or is overloaded. Safe to retry.
    #[error("vecstore: unavailable: {0}")]
    Unavailable(String),

    #[error("vecstore: collection not found: {0}")]
    CollectionNotFound(String),

    #[error("vecstore: storage error: {0}")]
    Io(String),

    #[error("vecstore: serialization error: {0}")]
    Serialization(String),
}

impl VecError {
    /// Returns true for failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, VecError::Unavailable(_))
    }
}

impl From<facelink_kv::KVError> for VecError {
    fn from(e: facelink_kv::KVError) -> Self {
        match e {
            facelink_kv::KVError::Serialization(msg) => VecError::Serialization(msg),
            other => VecError::Io(other.to_string()),
        }
    }
}
