use std::sync::Arc;

use facelink_vecstore::{Filter, Point, PointPayload, ScoredPoint, ScrollPage, SimilarityClient, VecError};

use crate::album::IdentityStore;
use crate::config::ResolveConfig;
use crate::error::{ResolveError, Result};
use crate::ledger::ReviewLedger;
use crate::locks::KeyedLocks;
use crate::retry::RetryPolicy;
use crate::types::{Resolution, ReviewEntry, ReviewMember};

/// Collaborators shared by the matcher, resolver, sweep and editor.
///
/// Every call to the index or the ledger goes through [RetryPolicy]. Searches
/// and scrolls of a collection that does not exist yet return empty results.
pub struct Context {
    pub cfg: ResolveConfig,
    pub index: Arc<dyn SimilarityClient>,
    pub ledger: Arc<dyn ReviewLedger>,
    pub albums: Arc<dyn IdentityStore>,
    pub retry: RetryPolicy,
    pub locks: KeyedLocks,
}

impl Context {
    pub fn new(
        cfg: ResolveConfig,
        index: Arc<dyn SimilarityClient>,
        ledger: Arc<dyn ReviewLedger>,
        albums: Arc<dyn IdentityStore>,
    ) -> Self {
        let retry = RetryPolicy::new(cfg.retry);
        Self {
            cfg,
            index,
            ledger,
            albums,
            retry,
            locks: KeyedLocks::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Index
    // -----------------------------------------------------------------------

    pub async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>> {
        let index = &self.index;
        let res = self
            .retry
            .run("search", || async move {
                index.search(collection, vector, limit, filter).await
            })
            .await;
        match res {
            Err(ResolveError::Vector(VecError::CollectionNotFound(_))) => Ok(Vec::new()),
            other => other,
        }
    }

    pub async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let index = &self.index;
        self.retry
            .run("upsert", || {
                let points = points.clone();
                async move { index.upsert(collection, points).await }
            })
            .await
    }

    pub async fn get_point(&self, collection: &str, id: &str) -> Result<Option<Point>> {
        let index = &self.index;
        let res = self
            .retry
            .run("get", || async move { index.get(collection, id).await })
            .await;
        match res {
            Err(ResolveError::Vector(VecError::CollectionNotFound(_))) => Ok(None),
            other => other,
        }
    }

    pub async fn scroll(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        offset: Option<&str>,
        limit: usize,
    ) -> Result<ScrollPage> {
        let index = &self.index;
        let res = self
            .retry
            .run("scroll", || async move {
                index.scroll(collection, filter, offset, limit, true).await
            })
            .await;
        match res {
            Err(ResolveError::Vector(VecError::CollectionNotFound(_))) => Ok(ScrollPage::default()),
            other => other,
        }
    }

    /// Writes the pending-collection point mirroring `entry`.
    pub async fn upsert_pending(&self, entry: &ReviewEntry) -> Result<()> {
        self.upsert(&self.cfg.pending_collection, vec![pending_point(entry)])
            .await
    }

    // -----------------------------------------------------------------------
    // Ledger
    // -----------------------------------------------------------------------

    pub async fn review(&self, id: &str) -> Result<Option<ReviewEntry>> {
        let ledger = &self.ledger;
        self.retry
            .run("ledger.get", || async move { ledger.get(id).await })
            .await
    }

    pub async fn insert_review(&self, entry: &ReviewEntry) -> Result<()> {
        let ledger = &self.ledger;
        self.retry
            .run("ledger.insert", || async move { ledger.insert(entry).await })
            .await
    }

    pub async fn pending_batch(&self, skip: usize, limit: usize) -> Result<Vec<ReviewEntry>> {
        let ledger = &self.ledger;
        self.retry
            .run("ledger.pending_batch", || async move {
                ledger.get_pending_batch(skip, limit).await
            })
            .await
    }

    pub async fn pending_by_group(&self, group_id: &str) -> Result<Vec<ReviewEntry>> {
        let ledger = &self.ledger;
        self.retry
            .run("ledger.pending_by_group", || async move {
                ledger.get_pending_by_group(group_id).await
            })
            .await
    }

    /// Compare-and-set resolution. Tried once: a retry after a lost reply
    /// would see its own write as [ResolveError::AlreadyResolved].
    pub async fn mark_resolved(&self, id: &str, resolution: Resolution) -> Result<ReviewEntry> {
        let once = RetryPolicy::once(self.cfg.retry.timeout());
        let ledger = &self.ledger;
        once.run("ledger.mark_resolved", || {
            let resolution = resolution.clone();
            async move { ledger.mark_resolved(id, resolution).await }
        })
        .await
    }

    pub async fn update_suggestion(
        &self,
        id: &str,
        identity_id: Option<&str>,
        score: Option<f32>,
    ) -> Result<ReviewEntry> {
        let ledger = &self.ledger;
        self.retry
            .run("ledger.update_suggestion", || async move {
                ledger.update_suggestion(id, identity_id, score).await
            })
            .await
    }

    pub async fn update_members(
        &self,
        id: &str,
        members: Vec<ReviewMember>,
        centroid: Vec<f32>,
        thumbnail: Option<String>,
    ) -> Result<ReviewEntry> {
        let ledger = &self.ledger;
        self.retry
            .run("ledger.update_members", || {
                let (members, centroid, thumbnail) =
                    (members.clone(), centroid.clone(), thumbnail.clone());
                async move {
                    ledger
                        .update_members(id, members, centroid, thumbnail)
                        .await
                }
            })
            .await
    }
}

/// Pending-collection point for a review entry. The point id is the review id.
pub fn pending_point(entry: &ReviewEntry) -> Point {
    let payload = PointPayload::pending(&entry.id)
        .with_image(entry.image_id.clone())
        .with_gender(entry.gender)
        .with_group(entry.group_id.clone())
        .with_suggestion(entry.suggested_identity_id.clone(), entry.suggested_score)
        .with_resolved(entry.resolved());
    Point::new(&entry.id, entry.vector.clone(), payload)
}

/// Confirmed-collection points for every face of an accepted entry.
pub fn confirmed_points(entry: &ReviewEntry, identity_id: &str) -> Vec<Point> {
    entry
        .faces()
        .into_iter()
        .filter(|(_, _, vector)| !vector.is_empty())
        .map(|(face_id, image_id, vector)| {
            let payload = PointPayload::confirmed(identity_id)
                .with_image(Some(image_id).filter(|s| !s.is_empty()))
                .with_gender(entry.gender);
            Point::new(face_id, vector, payload)
        })
        .collect()
}
