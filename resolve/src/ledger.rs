use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use facelink_kv::{KVStore, WriteOp, encode, get_record, suffixes};

use crate::error::{ResolveError, Result};
use crate::keys::{PENDING_PREFIX, group_key, group_prefix, pending_key, review_key};
use crate::types::{Resolution, ReviewEntry, ReviewMember};

/// Store of review entries.
///
/// Resolution is a compare-and-set: `mark_resolved` fails with
/// [ResolveError::AlreadyResolved] if another caller resolved the entry first,
/// so two concurrent decisions on one entry never both apply.
#[async_trait]
pub trait ReviewLedger: Send + Sync {
    async fn insert(&self, entry: &ReviewEntry) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<ReviewEntry>>;

    /// First `limit` unresolved entries in ledger order.
    async fn list_unresolved(&self, limit: usize) -> Result<Vec<ReviewEntry>>;

    /// Unresolved entries `skip..skip + limit` in ledger order.
    async fn get_pending_batch(&self, skip: usize, limit: usize) -> Result<Vec<ReviewEntry>>;

    /// Unresolved entries carrying exactly this group id.
    async fn get_pending_by_group(&self, group_id: &str) -> Result<Vec<ReviewEntry>>;

    /// Resolve an unresolved entry and return its new state.
    async fn mark_resolved(&self, id: &str, resolution: Resolution) -> Result<ReviewEntry>;

    /// Replace the suggestion of an unresolved entry and return it.
    async fn update_suggestion(
        &self,
        id: &str,
        identity_id: Option<&str>,
        score: Option<f32>,
    ) -> Result<ReviewEntry>;

    /// Replace the member list, vector and thumbnail of an unresolved entry.
    async fn update_members(
        &self,
        id: &str,
        members: Vec<ReviewMember>,
        centroid: Vec<f32>,
        thumbnail: Option<String>,
    ) -> Result<ReviewEntry>;
}

/// [ReviewLedger] on a [KVStore].
///
/// Every mutation rewrites the entry and its index markers in one
/// [KVStore::apply] call. Read-modify-write cycles are serialized by a
/// process-local mutex.
pub struct KvReviewLedger {
    store: Arc<dyn KVStore>,
    write: Mutex<()>,
}

impl KvReviewLedger {
    pub fn new(store: Arc<dyn KVStore>) -> Self {
        Self {
            store,
            write: Mutex::new(()),
        }
    }

    fn load(&self, id: &str) -> Result<Option<ReviewEntry>> {
        Ok(get_record(self.store.as_ref(), &review_key(id))?)
    }

    fn pending_ids(&self) -> Result<Vec<String>> {
        let entries = self.store.scan(PENDING_PREFIX)?;
        Ok(suffixes(&entries, PENDING_PREFIX))
    }

    fn load_unresolved(&self, ids: impl IntoIterator<Item = String>) -> Result<Vec<ReviewEntry>> {
        let mut out = Vec::new();
        for id in ids {
            if let Some(entry) = self.load(&id)? {
                if !entry.resolved() {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }

    /// Load an unresolved entry, apply `f`, and persist it.
    fn modify<F>(&self, id: &str, f: F) -> Result<ReviewEntry>
    where
        F: FnOnce(&mut ReviewEntry),
    {
        let _w = self.write.lock().expect("lock poisoned");
        let mut entry = self
            .load(id)?
            .ok_or_else(|| ResolveError::ReviewNotFound(id.to_string()))?;
        if entry.resolved() {
            return Err(ResolveError::AlreadyResolved(id.to_string()));
        }
        f(&mut entry);
        entry.updated_at = Utc::now();

        let mut ops = vec![WriteOp::put(review_key(id), encode(&entry)?)];
        if entry.resolved() {
            ops.push(WriteOp::delete(pending_key(id)));
        }
        self.store.apply(&ops)?;
        Ok(entry)
    }
}

#[async_trait]
impl ReviewLedger for KvReviewLedger {
    async fn insert(&self, entry: &ReviewEntry) -> Result<()> {
        let _w = self.write.lock().expect("lock poisoned");
        let mut ops = vec![WriteOp::put(review_key(&entry.id), encode(entry)?)];
        if !entry.resolved() {
            ops.push(WriteOp::mark(pending_key(&entry.id)));
        }
        if let Some(group) = &entry.group_id {
            ops.push(WriteOp::mark(group_key(group, &entry.id)));
        }
        self.store.apply(&ops)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ReviewEntry>> {
        self.load(id)
    }

    async fn list_unresolved(&self, limit: usize) -> Result<Vec<ReviewEntry>> {
        self.get_pending_batch(0, limit).await
    }

    async fn get_pending_batch(&self, skip: usize, limit: usize) -> Result<Vec<ReviewEntry>> {
        let ids = self.pending_ids()?;
        self.load_unresolved(ids.into_iter().skip(skip).take(limit))
    }

    async fn get_pending_by_group(&self, group_id: &str) -> Result<Vec<ReviewEntry>> {
        let prefix = group_prefix(group_id);
        let entries = self.store.scan(&prefix)?;
        self.load_unresolved(suffixes(&entries, &prefix))
    }

    async fn mark_resolved(&self, id: &str, resolution: Resolution) -> Result<ReviewEntry> {
        self.modify(id, |entry| entry.state = resolution.into())
    }

    async fn update_suggestion(
        &self,
        id: &str,
        identity_id: Option<&str>,
        score: Option<f32>,
    ) -> Result<ReviewEntry> {
        self.modify(id, |entry| {
            entry.suggested_identity_id = identity_id.map(str::to_string);
            entry.suggested_score = score;
        })
    }

    async fn update_members(
        &self,
        id: &str,
        members: Vec<ReviewMember>,
        centroid: Vec<f32>,
        thumbnail: Option<String>,
    ) -> Result<ReviewEntry> {
        self.modify(id, |entry| {
            entry.members = members;
            entry.vector = centroid;
            entry.thumbnail = thumbnail;
        })
    }
}
