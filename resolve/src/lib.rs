//! Face identity resolution.
//!
//! Detected faces are matched against confirmed identities held in a
//! similarity index. Faces that match nothing are grouped into provisional
//! clusters and queued as review entries. A human decision on one entry is
//! propagated to near-duplicates and group mates, and a sweep re-evaluates
//! what is still pending.
//!
//! The index and the review ledger share no transaction. The ledger decides
//! ownership of every resolution (compare-and-set); the index follows it, and
//! [Engine::reconcile] repairs the index after a partial failure.

pub mod album;
pub mod config;
pub mod context;
pub mod duplicate;
pub mod editor;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod keys;
pub mod ledger;
pub mod locks;
pub mod matcher;
pub mod reconcile;
pub mod retry;
pub mod scan;
pub mod sweep;
pub mod types;

pub use album::{IdentityStore, KvIdentityStore};
pub use config::{ResolveConfig, RetryConfig};
pub use context::Context;
pub use duplicate::DuplicateResolver;
pub use editor::MemberEditor;
pub use engine::Engine;
pub use error::{ResolveError, Result};
pub use jobs::{JobStore, KvJobStore};
pub use ledger::{KvReviewLedger, ReviewLedger};
pub use matcher::IdentityMatcher;
pub use reconcile::Reconciler;
pub use retry::RetryPolicy;
pub use scan::{FaceSource, ScanRegistry};
pub use sweep::PendingSweep;
pub use types::{
    AcceptOutcome, BoundingBox, ClusterFace, DetectedFace, Identity, IdentityCluster,
    IdentityMatch, ReconcileReport, RemoveOutcome, Resolution, ResolutionState, ReviewEntry,
    ReviewMember, ScanState, ScanStatus, SubmitOutcome, SweepReport,
};

#[cfg(test)]
mod tests;
