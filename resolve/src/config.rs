use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

/// Retry behavior for calls to the similarity index and the review ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one. Default: 4.
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on every further attempt.
    /// Default: 100ms.
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay. Default: 5s.
    pub max_delay_ms: u64,

    /// Deadline for one attempt. Default: 10s.
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            timeout_ms: 10_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Engine configuration.
///
/// The two similarity thresholds encode different risks and are tuned
/// independently: `match_threshold` decides when a confirmed identity is
/// suggested or auto-assigned to a new face, `auto_resolve_threshold` decides
/// when a pending face is silently merged into an identity a human has just
/// confirmed for a near-duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Embedding dimension. Default: 512.
    pub dim: usize,

    /// Minimum score for a confirmed identity to count as a match.
    /// Default: 0.72.
    pub match_threshold: f32,

    /// Minimum score for propagating an acceptance to a pending face.
    /// Default: 0.49.
    pub auto_resolve_threshold: f32,

    /// Minimum centroid similarity for joining a provisional cluster during
    /// a scan. Default: 0.49.
    pub cluster_threshold: f32,

    /// Neighbours fetched from the confirmed collection per match.
    /// Default: 10.
    pub top_k: usize,

    /// Neighbours fetched from the pending collection when looking for
    /// duplicates of an accepted face. Default: 50.
    pub duplicate_top_k: usize,

    /// Pending entries re-scored per sweep batch. Default: 500.
    pub sweep_batch_size: usize,

    /// Maximum face ids kept as samples on a confirmed cluster. Default: 12.
    pub sample_cap: usize,

    pub confirmed_collection: String,
    pub pending_collection: String,

    pub retry: RetryConfig,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            dim: 512,
            match_threshold: 0.72,
            auto_resolve_threshold: 0.49,
            cluster_threshold: 0.49,
            top_k: 10,
            duplicate_top_k: 50,
            sweep_batch_size: 500,
            sample_cap: 12,
            confirmed_collection: "faces_confirmed".into(),
            pending_collection: "faces_pending".into(),
            retry: RetryConfig::default(),
        }
    }
}

impl ResolveConfig {
    /// Replaces zero-valued sizes and empty names with defaults.
    pub fn with_defaults(mut self) -> Self {
        let d = Self::default();
        if self.dim == 0 {
            self.dim = d.dim;
        }
        if self.top_k == 0 {
            self.top_k = d.top_k;
        }
        if self.duplicate_top_k == 0 {
            self.duplicate_top_k = d.duplicate_top_k;
        }
        if self.sweep_batch_size == 0 {
            self.sweep_batch_size = d.sweep_batch_size;
        }
        if self.sample_cap == 0 {
            self.sample_cap = d.sample_cap;
        }
        if self.confirmed_collection.is_empty() {
            self.confirmed_collection = d.confirmed_collection;
        }
        if self.pending_collection.is_empty() {
            self.pending_collection = d.pending_collection;
        }
        if self.retry.max_attempts == 0 {
            self.retry.max_attempts = 1;
        }
        if self.retry.timeout_ms == 0 {
            self.retry.timeout_ms = d.retry.timeout_ms;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, t) in [
            ("match_threshold", self.match_threshold),
            ("auto_resolve_threshold", self.auto_resolve_threshold),
            ("cluster_threshold", self.cluster_threshold),
        ] {
            if !(-1.0..=1.0).contains(&t) {
                return Err(ResolveError::Config(format!(
                    "{name} must be within [-1, 1], got {t}"
                )));
            }
        }
        if self.confirmed_collection == self.pending_collection {
            return Err(ResolveError::Config(
                "confirmed and pending collections must differ".into(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ResolveError::Config(
                "retry.base_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        Ok(())
    }
}
