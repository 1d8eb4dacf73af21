use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::duplicate::resolve_entry;
use crate::error::{ResolveError, Result};
use crate::locks::identity_scope;
use crate::matcher::{IdentityMatcher, accepts};
use crate::types::{ReviewEntry, SweepReport};

/// What one pending entry turned into during a sweep.
enum Step {
    Resolved,
    Suggested,
    Unchanged,
}

/// Re-evaluates pending reviews against the confirmed collection after an
/// identity gained faces.
pub struct PendingSweep {
    ctx: Arc<Context>,
    matcher: IdentityMatcher,
}

impl PendingSweep {
    pub fn new(ctx: Arc<Context>) -> Self {
        let matcher = IdentityMatcher::new(ctx.clone());
        Self { ctx, matcher }
    }

    /// Sweep every pending review for `identity_id`, holding the identity
    /// lock for the whole pass.
    pub async fn sweep(&self, identity_id: &str, cancel: &CancellationToken) -> Result<SweepReport> {
        let _guard = self.ctx.locks.lock(&identity_scope(identity_id)).await;
        self.run_locked(identity_id, cancel).await
    }

    /// Sweep body. The caller must hold the identity lock.
    pub(crate) async fn run_locked(
        &self,
        identity_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SweepReport> {
        let batch_size = self.ctx.cfg.sweep_batch_size.max(1);
        let mut report = SweepReport::default();
        let mut skip = 0;

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let batch = self.ctx.pending_batch(skip, batch_size).await?;
            if batch.is_empty() {
                break;
            }

            let mut left_listing = 0;
            for entry in &batch {
                report.scanned += 1;
                match self.visit(entry, identity_id).await {
                    Ok(Step::Resolved) => {
                        report.resolved += 1;
                        left_listing += 1;
                    }
                    Ok(Step::Suggested) => report.suggested += 1,
                    Ok(Step::Unchanged) => {}
                    Err(ResolveError::AlreadyResolved(_) | ResolveError::ReviewNotFound(_)) => {
                        // Resolved by someone else since the batch was read.
                        left_listing += 1;
                    }
                    Err(e) => {
                        warn!(review = %entry.id, error = %e, "sweep: entry skipped");
                        report.skipped += 1;
                    }
                }
            }
            skip += batch.len() - left_listing;
        }

        info!(
            identity = identity_id,
            scanned = report.scanned,
            resolved = report.resolved,
            suggested = report.suggested,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "sweep finished"
        );
        Ok(report)
    }

    async fn visit(&self, entry: &ReviewEntry, identity_id: &str) -> Result<Step> {
        // Nothing to score.
        if entry.vector.is_empty() {
            return Ok(Step::Unchanged);
        }
        let best = self
            .matcher
            .try_best_candidate(&entry.vector, entry.gender, self.ctx.cfg.top_k)
            .await?;

        if let Some(m) = &best {
            if m.identity_id == identity_id && accepts(m.score, self.ctx.cfg.auto_resolve_threshold) {
                debug!(review = %entry.id, identity = identity_id, score = m.score, "sweep: resolving");
                resolve_entry(&self.ctx, entry, identity_id, None).await?;
                return Ok(Step::Resolved);
            }
        }

        let identity = best.as_ref().map(|m| m.identity_id.as_str());
        let score = best.as_ref().map(|m| m.score);
        if entry.suggested_identity_id.as_deref() == identity && entry.suggested_score == score {
            return Ok(Step::Unchanged);
        }
        let updated = self.ctx.update_suggestion(&entry.id, identity, score).await?;
        self.ctx.upsert_pending(&updated).await?;
        Ok(Step::Suggested)
    }
}
