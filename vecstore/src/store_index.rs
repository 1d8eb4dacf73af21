use std::sync::Arc;

use async_trait::async_trait;
use facelink_kv::{KVStore, MemoryStore, decode, encode};

use crate::client::SimilarityClient;
use crate::cosine::cosine_similarity;
use crate::error::VecError;
use crate::point::{Filter, Point, ScoredPoint, ScrollPage};

/// Raw page size used while scrolling through filtered points.
const SCAN_PAGE: usize = 256;

fn collection_prefix(collection: &str) -> String {
    format!("vec:{collection}:")
}

fn point_key(collection: &str, id: &str) -> String {
    format!("vec:{collection}:{id}")
}

/// StoreIndex is a [SimilarityClient] that keeps points in a [KVStore] and
/// answers searches by brute-force cosine similarity.
///
/// Intended for tests, the CLI and small catalogues (a few thousand faces
/// per collection). Scores are cosine similarities in `[-1, 1]`.
pub struct StoreIndex {
    store: Arc<dyn KVStore>,
    dim: Option<usize>,
}

impl StoreIndex {
    pub fn new(store: Arc<dyn KVStore>) -> Self {
        Self { store, dim: None }
    }

    /// An index over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Reject upserts and queries whose dimension differs from `dim`.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    fn check_dim(&self, got: usize) -> Result<(), VecError> {
        match self.dim {
            Some(want) if want != got => Err(VecError::DimensionMismatch { got, want }),
            _ => Ok(()),
        }
    }

    /// Number of points stored in `collection`.
    pub fn len(&self, collection: &str) -> Result<usize, VecError> {
        Ok(self.store.scan(&collection_prefix(collection))?.len())
    }

    pub fn is_empty(&self, collection: &str) -> Result<bool, VecError> {
        Ok(self.len(collection)? == 0)
    }
}

#[async_trait]
impl SimilarityClient for StoreIndex {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>, VecError> {
        self.check_dim(vector.len())?;
        if limit == 0 {
            return Ok(vec![]);
        }

        let mut results: Vec<ScoredPoint> = Vec::new();
        for (_, data) in self.store.scan(&collection_prefix(collection))? {
            let point: Point = decode(&data)?;
            if filter.is_some_and(|f| !f.matches(&point.payload)) {
                continue;
            }
            results.push(ScoredPoint {
                score: cosine_similarity(vector, &point.vector),
                id: point.id,
                payload: point.payload,
            });
        }

        // Stable sort keeps id order among equal scores.
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), VecError> {
        let mut ops = Vec::with_capacity(points.len());
        for point in &points {
            self.check_dim(point.vector.len())?;
            ops.push(facelink_kv::WriteOp::put(
                point_key(collection, &point.id),
                encode(point)?,
            ));
        }
        self.store.apply(&ops)?;
        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        offset: Option<&str>,
        limit: usize,
        with_vectors: bool,
    ) -> Result<ScrollPage, VecError> {
        let prefix = collection_prefix(collection);
        let mut cursor = offset.map(|id| point_key(collection, id));
        let mut page = ScrollPage::default();
        if limit == 0 {
            return Ok(page);
        }

        loop {
            let raw = self.store.scan_page(&prefix, cursor.as_deref(), SCAN_PAGE)?;
            let exhausted = raw.len() < SCAN_PAGE;
            for (key, data) in raw {
                let mut point: Point = decode(&data)?;
                cursor = Some(key);
                if filter.is_some_and(|f| !f.matches(&point.payload)) {
                    continue;
                }
                if !with_vectors {
                    point.vector.clear();
                }
                page.points.push(point);
                if page.points.len() == limit {
                    page.next_offset = page.points.last().map(|p| p.id.clone());
                    return Ok(page);
                }
            }
            if exhausted {
                return Ok(page);
            }
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Point>, VecError> {
        match self.store.get(&point_key(collection, id))? {
            Some(data) => Ok(Some(decode(&data)?)),
            None => Ok(None),
        }
    }
}
