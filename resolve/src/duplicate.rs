use std::sync::Arc;

use chrono::Utc;
use facelink_vecstore::{Filter, Gender, Point, PointPayload};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{Context, confirmed_points};
use crate::error::{ResolveError, Result};
use crate::locks::{identity_scope, review_scope};
use crate::matcher::accepts;
use crate::sweep::PendingSweep;
use crate::types::{
    AcceptOutcome, ClusterFace, DetectedFace, Identity, IdentityCluster, IdentityMatch,
    Resolution, ReviewEntry, SweepReport,
};

/// Applies an acceptance and fans it out to near-duplicate and same-group
/// pending reviews, then sweeps the remaining pending reviews.
///
/// All work for one identity runs under that identity's lock.
pub struct DuplicateResolver {
    ctx: Arc<Context>,
    sweep: PendingSweep,
}

impl DuplicateResolver {
    pub fn new(ctx: Arc<Context>) -> Self {
        let sweep = PendingSweep::new(ctx.clone());
        Self { ctx, sweep }
    }

    /// Accept `review_id` as `identity_id`.
    ///
    /// Fails without side effects when the identity id is empty, or when the
    /// review is missing, already resolved or has no vector. Failures while
    /// propagating to other entries are logged and skipped.
    pub async fn on_accepted(
        &self,
        review_id: &str,
        identity_id: &str,
        display_name: Option<&str>,
    ) -> Result<AcceptOutcome> {
        if identity_id.is_empty() {
            return Err(ResolveError::EmptyIdentity);
        }
        let _identity = self.ctx.locks.lock(&identity_scope(identity_id)).await;
        let _review = self.ctx.locks.lock(&review_scope(review_id)).await;

        let entry = self
            .ctx
            .review(review_id)
            .await?
            .ok_or_else(|| ResolveError::ReviewNotFound(review_id.to_string()))?;
        if entry.resolved() {
            return Err(ResolveError::AlreadyResolved(review_id.to_string()));
        }
        if entry.vector.is_empty() {
            return Err(ResolveError::MissingVector(review_id.to_string()));
        }

        let accepted = resolve_entry(&self.ctx, &entry, identity_id, display_name).await?;
        info!(
            review = review_id,
            identity = identity_id,
            faces = accepted.face_count(),
            "review accepted"
        );

        let duplicates = self
            .propagate_similar(Some(review_id), &accepted.vector, accepted.gender, identity_id)
            .await;
        let group_mates = match &accepted.group_id {
            Some(group) => self.propagate_group(group, review_id, identity_id).await,
            None => Vec::new(),
        };
        let sweep = self.sweep_locked(identity_id).await;

        Ok(AcceptOutcome {
            review_id: review_id.to_string(),
            identity_id: identity_id.to_string(),
            duplicates,
            group_mates,
            sweep,
        })
    }

    /// Confirm a freshly detected face that matched `found`, with no review
    /// entry of its own. Returns the pending reviews resolved as duplicates.
    /// With `sweep` false the caller is expected to sweep the identity later.
    pub async fn accept_detected(
        &self,
        face: &DetectedFace,
        found: &IdentityMatch,
        sweep: bool,
    ) -> Result<Vec<String>> {
        if face.vector.is_empty() {
            return Err(ResolveError::MissingVector(face.id.clone()));
        }
        let identity_id = found.identity_id.as_str();
        let _identity = self.ctx.locks.lock(&identity_scope(identity_id)).await;

        let payload = PointPayload::confirmed(identity_id)
            .with_image(Some(face.image_id.clone()).filter(|s| !s.is_empty()))
            .with_gender(face.gender);
        self.ctx
            .upsert(
                &self.ctx.cfg.confirmed_collection,
                vec![Point::new(&face.id, face.vector.clone(), payload)],
            )
            .await?;
        record_faces(
            &self.ctx,
            identity_id,
            None,
            vec![ClusterFace {
                image_id: face.image_id.clone(),
                face_id: face.id.clone(),
            }],
        )
        .await?;
        debug!(face = %face.id, identity = identity_id, score = found.score, "detected face confirmed");

        let duplicates = self
            .propagate_similar(None, &face.vector, face.gender, identity_id)
            .await;
        if sweep {
            self.sweep_locked(identity_id).await;
        }
        Ok(duplicates)
    }

    /// Reject a single unresolved review. Rejections do not propagate.
    pub async fn reject(&self, review_id: &str) -> Result<ReviewEntry> {
        let _review = self.ctx.locks.lock(&review_scope(review_id)).await;
        let rejected = self.ctx.mark_resolved(review_id, Resolution::Rejected).await?;
        self.ctx.upsert_pending(&rejected).await?;
        info!(review = review_id, "review rejected");
        Ok(rejected)
    }

    async fn sweep_locked(&self, identity_id: &str) -> SweepReport {
        match self
            .sweep
            .run_locked(identity_id, &CancellationToken::new())
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(identity = identity_id, error = %e, "sweep after acceptance failed");
                SweepReport::default()
            }
        }
    }

    /// Resolve unresolved pending reviews whose vector is within the
    /// auto-resolve threshold of `vector`.
    async fn propagate_similar(
        &self,
        exclude: Option<&str>,
        vector: &[f32],
        gender: Option<Gender>,
        identity_id: &str,
    ) -> Vec<String> {
        let filter = Filter::unresolved().with_gender(gender);
        let hits = match self
            .ctx
            .search(
                &self.ctx.cfg.pending_collection,
                vector,
                self.ctx.cfg.duplicate_top_k,
                Some(&filter),
            )
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(identity = identity_id, error = %e, "duplicate search failed");
                return Vec::new();
            }
        };

        let mut resolved = Vec::new();
        for hit in hits {
            let review_id = hit.payload.review_id.clone().unwrap_or(hit.id);
            if exclude == Some(review_id.as_str())
                || !accepts(hit.score, self.ctx.cfg.auto_resolve_threshold)
            {
                continue;
            }
            if self.resolve_mate(&review_id, identity_id).await {
                debug!(review = %review_id, score = hit.score, "duplicate resolved");
                resolved.push(review_id);
            }
        }
        resolved
    }

    /// Resolve every other unresolved review sharing `group_id`.
    async fn propagate_group(&self, group_id: &str, exclude: &str, identity_id: &str) -> Vec<String> {
        let mates = match self.ctx.pending_by_group(group_id).await {
            Ok(mates) => mates,
            Err(e) => {
                warn!(group = group_id, error = %e, "group lookup failed");
                return Vec::new();
            }
        };
        let mut resolved = Vec::new();
        for mate in mates.into_iter().filter(|m| m.id != exclude) {
            if self.resolve_mate(&mate.id, identity_id).await {
                resolved.push(mate.id);
            }
        }
        resolved
    }

    /// Resolve a propagated entry. Entries that are gone or already resolved
    /// are skipped silently.
    async fn resolve_mate(&self, review_id: &str, identity_id: &str) -> bool {
        let entry = match self.ctx.review(review_id).await {
            Ok(Some(entry)) if !entry.resolved() => entry,
            Ok(_) => return false,
            Err(e) => {
                warn!(review = review_id, error = %e, "propagation: lookup failed");
                return false;
            }
        };
        match resolve_entry(&self.ctx, &entry, identity_id, None).await {
            Ok(_) => true,
            Err(ResolveError::AlreadyResolved(_) | ResolveError::ReviewNotFound(_)) => false,
            Err(e) => {
                warn!(review = review_id, error = %e, "propagation: entry skipped");
                false
            }
        }
    }
}

/// Accept one entry: mark it in the ledger, confirm its faces in the index
/// and the identity album, then flag its pending point resolved.
///
/// The caller must hold the identity lock.
pub(crate) async fn resolve_entry(
    ctx: &Context,
    entry: &ReviewEntry,
    identity_id: &str,
    display_name: Option<&str>,
) -> Result<ReviewEntry> {
    let accepted = ctx
        .mark_resolved(
            &entry.id,
            Resolution::Accepted {
                identity_id: identity_id.to_string(),
            },
        )
        .await?;

    ctx.upsert(
        &ctx.cfg.confirmed_collection,
        confirmed_points(&accepted, identity_id),
    )
    .await?;
    let faces = accepted
        .faces()
        .into_iter()
        .map(|(face_id, image_id, _)| ClusterFace { image_id, face_id })
        .collect();
    record_faces(ctx, identity_id, display_name, faces).await?;
    ctx.upsert_pending(&accepted).await?;
    Ok(accepted)
}

/// Append faces to the identity's confirmed cluster, creating the identity
/// on first use.
async fn record_faces(
    ctx: &Context,
    identity_id: &str,
    display_name: Option<&str>,
    faces: Vec<ClusterFace>,
) -> Result<()> {
    let mut cluster = ctx
        .albums
        .cluster(identity_id)
        .await?
        .unwrap_or_else(|| IdentityCluster::new(identity_id));
    cluster.append(faces, ctx.cfg.sample_cap);

    let display_name = display_name.filter(|n| !n.is_empty());
    let mut identity = match ctx.albums.get(identity_id).await? {
        Some(identity) => identity,
        None => Identity::new(identity_id, display_name.unwrap_or(identity_id)),
    };
    if let Some(name) = display_name {
        identity.display_name = name.to_string();
    }
    identity.face_count = cluster.members.len();
    identity.image_count = cluster.image_count;
    identity.dominant_cluster = Some(cluster.id.clone());
    identity.updated_at = Utc::now();

    ctx.albums.upsert_with_cluster(&identity, &cluster).await
}
