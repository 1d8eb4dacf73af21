use async_trait::async_trait;

use crate::error::VecError;
use crate::point::{Filter, Point, ScoredPoint, ScrollPage};

/// SimilarityClient is the interface to a vector similarity service holding
/// named collections of points.
///
/// Every call is a potential network round trip. Searching or scrolling a
/// collection that does not exist yet returns an empty result, not an error:
/// an empty index is the normal state at bootstrap.
///
/// All implementations must be safe for concurrent use (Send + Sync).
#[async_trait]
pub trait SimilarityClient: Send + Sync {
    /// Return up to `limit` points ordered by descending score. Points that
    /// do not match `filter` are never returned.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>, VecError>;

    /// Insert or replace points by id.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), VecError>;

    /// Page through a collection in id order, starting after `offset`.
    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        offset: Option<&str>,
        limit: usize,
        with_vectors: bool,
    ) -> Result<ScrollPage, VecError>;

    /// Fetch a single point by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Point>, VecError>;
}
