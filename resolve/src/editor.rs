use std::sync::Arc;

use facelink_vecid::mean_vector;
use tracing::info;

use crate::context::Context;
use crate::error::{ResolveError, Result};
use crate::locks::review_scope;
use crate::matcher::IdentityMatcher;
use crate::types::{DetectedFace, RemoveOutcome, Resolution, ReviewEntry, ReviewMember};

/// Splits faces out of cluster reviews.
pub struct MemberEditor {
    ctx: Arc<Context>,
    matcher: IdentityMatcher,
}

impl MemberEditor {
    pub fn new(ctx: Arc<Context>) -> Self {
        let matcher = IdentityMatcher::new(ctx.clone());
        Self { ctx, matcher }
    }

    /// Move `member_id` out of review `review_id` into a new singleton
    /// review. The parent is rejected once its last member is gone.
    ///
    /// The parent is rewritten before the new review is created, so a parent
    /// that gets resolved concurrently never leaves the face in two places.
    pub async fn remove_member(&self, review_id: &str, member_id: &str) -> Result<RemoveOutcome> {
        let _review = self.ctx.locks.lock(&review_scope(review_id)).await;

        let entry = self
            .ctx
            .review(review_id)
            .await?
            .ok_or_else(|| ResolveError::ReviewNotFound(review_id.to_string()))?;
        if entry.resolved() {
            return Err(ResolveError::AlreadyResolved(review_id.to_string()));
        }
        let Some(pos) = entry.members.iter().position(|m| m.id == member_id) else {
            return Ok(RemoveOutcome::MemberNotFound);
        };

        let mut remaining = entry.members.clone();
        let member = remaining.remove(pos);
        let vector = vector_or(&member, &entry.vector);
        if vector.is_empty() {
            return Err(ResolveError::MissingVector(member.id));
        }
        let suggestion = self.matcher.best_candidate(&vector, entry.gender).await;

        let original_rejected = remaining.is_empty();
        if original_rejected {
            self.ctx
                .update_members(review_id, Vec::new(), entry.vector.clone(), None)
                .await?;
            let rejected = self
                .ctx
                .mark_resolved(review_id, Resolution::Rejected)
                .await?;
            self.ctx.upsert_pending(&rejected).await?;
        } else {
            let vectors: Vec<Vec<f32>> = remaining
                .iter()
                .map(|m| vector_or(m, &entry.vector))
                .collect();
            let centroid = mean_vector(&vectors).unwrap_or_else(|| entry.vector.clone());
            let thumbnail = remaining[0].thumbnail.clone();
            let updated = self
                .ctx
                .update_members(review_id, remaining, centroid, thumbnail)
                .await?;
            self.ctx.upsert_pending(&updated).await?;
        }

        let moved = ReviewEntry::singleton(DetectedFace {
            id: member.id,
            image_id: member.image_id,
            vector,
            bbox: member.bbox,
            thumbnail: member.thumbnail,
            gender: entry.gender,
        })
        .with_suggestion(suggestion.as_ref());
        self.ctx.insert_review(&moved).await?;
        self.ctx.upsert_pending(&moved).await?;

        info!(
            review = review_id,
            member = member_id,
            new_review = %moved.id,
            original_rejected,
            "member moved to its own review"
        );
        Ok(RemoveOutcome::Moved {
            new_review_id: moved.id,
            original_rejected,
        })
    }
}

fn vector_or(member: &ReviewMember, fallback: &[f32]) -> Vec<f32> {
    member
        .vector
        .clone()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_vec())
}
