use std::sync::Arc;

use facelink_vecstore::{Filter, Gender};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Result;
use crate::types::IdentityMatch;

/// Finds the confirmed identity closest to a face vector.
///
/// Only points in the confirmed collection that carry an identity id are
/// candidates. Ties keep the first hit the index returned.
pub struct IdentityMatcher {
    ctx: Arc<Context>,
}

impl IdentityMatcher {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Best candidate among the top `top_k` confirmed points, whatever its
    /// score. Errors from the index are returned.
    pub async fn try_best_candidate(
        &self,
        vector: &[f32],
        gender: Option<Gender>,
        top_k: usize,
    ) -> Result<Option<IdentityMatch>> {
        if vector.is_empty() || top_k == 0 {
            return Ok(None);
        }
        let filter = Filter::new().require_identity().with_gender(gender);
        let hits = self
            .ctx
            .search(&self.ctx.cfg.confirmed_collection, vector, top_k, Some(&filter))
            .await?;

        let mut best: Option<IdentityMatch> = None;
        for hit in hits {
            let Some(identity_id) = hit.payload.identity_id else {
                continue;
            };
            if best.as_ref().is_none_or(|b| hit.score > b.score) {
                best = Some(IdentityMatch {
                    identity_id,
                    score: hit.score,
                    point_id: hit.id,
                });
            }
        }
        Ok(best)
    }

    /// Best candidate, or None when the index is unreachable. Used where a
    /// missing suggestion is acceptable.
    pub async fn best_candidate(
        &self,
        vector: &[f32],
        gender: Option<Gender>,
    ) -> Option<IdentityMatch> {
        match self
            .try_best_candidate(vector, gender, self.ctx.cfg.top_k)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "identity search failed, no suggestion");
                None
            }
        }
    }

    /// Best identity whose score reaches `threshold` (inclusive). Index
    /// failures are logged and reported as no match.
    pub async fn best_match(
        &self,
        vector: &[f32],
        gender: Option<Gender>,
        top_k: usize,
        threshold: f32,
    ) -> Option<IdentityMatch> {
        let found = match self.try_best_candidate(vector, gender, top_k).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "identity search failed, treating as no match");
                return None;
            }
        };
        let found = found.filter(|m| accepts(m.score, threshold));
        if let Some(m) = &found {
            debug!(identity = %m.identity_id, score = m.score, "matched identity");
        }
        found
    }

    /// Match against the configured `match_threshold`.
    pub async fn match_face(&self, vector: &[f32], gender: Option<Gender>) -> Option<IdentityMatch> {
        self.best_match(
            vector,
            gender,
            self.ctx.cfg.top_k,
            self.ctx.cfg.match_threshold,
        )
        .await
    }
}

/// Scores equal to the threshold are accepted.
pub fn accepts(score: f32, threshold: f32) -> bool {
    score >= threshold
}
