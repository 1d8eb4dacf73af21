use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("resolve: vector index error: {0}")]
    Vector(#[from] facelink_vecstore::VecError),

    #[error("resolve: kv error: {0}")]
    KV(#[from] facelink_kv::KVError),

    #[error("resolve: cluster error: {0}")]
    Cluster(#[from] facelink_vecid::VecIdError),

    /// A collaborator is temporarily unreachable. Safe to retry.
    #[error("resolve: unavailable: {0}")]
    Unavailable(String),

    #[error("resolve: {op} timed out")]
    Timeout { op: String },

    #[error("resolve: invalid configuration: {0}")]
    Config(String),

    #[error("resolve: review {0} not found")]
    ReviewNotFound(String),

    #[error("resolve: review {0} is already resolved")]
    AlreadyResolved(String),

    #[error("resolve: identity id must not be empty")]
    EmptyIdentity,

    #[error("resolve: review {0} has no embedding vector")]
    MissingVector(String),

    #[error("resolve: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("resolve: cancelled")]
    Cancelled,

    #[error("resolve: scan failed: {0}")]
    Scan(String),
}

impl ResolveError {
    /// Returns true for failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ResolveError::Vector(e) => e.is_transient(),
            ResolveError::Unavailable(_) | ResolveError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns true for rejected operations that left no state behind and
    /// that the caller can fix by changing the request.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            ResolveError::ReviewNotFound(_)
                | ResolveError::AlreadyResolved(_)
                | ResolveError::MissingVector(_)
                | ResolveError::EmptyIdentity
                | ResolveError::DimensionMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
