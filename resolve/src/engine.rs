use std::sync::Arc;

use facelink_kv::KVStore;
use facelink_vecstore::{SimilarityClient, StoreIndex};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::album::{IdentityStore, KvIdentityStore};
use crate::config::ResolveConfig;
use crate::context::Context;
use crate::duplicate::DuplicateResolver;
use crate::editor::MemberEditor;
use crate::error::{ResolveError, Result};
use crate::jobs::{JobStore, KvJobStore};
use crate::ledger::{KvReviewLedger, ReviewLedger};
use crate::matcher::IdentityMatcher;
use crate::reconcile::Reconciler;
use crate::scan::{FaceSource, ScanRegistry};
use crate::sweep::PendingSweep;
use crate::types::{
    AcceptOutcome, DetectedFace, Identity, IdentityCluster, IdentityMatch, ReconcileReport,
    RemoveOutcome, ReviewEntry, ScanStatus, SubmitOutcome, SweepReport,
};

/// Entry point for identity resolution: bulk scans, single-face submission
/// and review decisions.
pub struct Engine {
    ctx: Arc<Context>,
    matcher: IdentityMatcher,
    resolver: Arc<DuplicateResolver>,
    sweep: Arc<PendingSweep>,
    editor: MemberEditor,
    reconciler: Reconciler,
    scans: ScanRegistry,
}

impl Engine {
    pub fn new(
        cfg: ResolveConfig,
        index: Arc<dyn SimilarityClient>,
        ledger: Arc<dyn ReviewLedger>,
        albums: Arc<dyn IdentityStore>,
        jobs: Arc<dyn JobStore>,
    ) -> Result<Self> {
        let cfg = cfg.with_defaults();
        cfg.validate()?;
        let ctx = Arc::new(Context::new(cfg, index, ledger, albums));
        Ok(Self {
            matcher: IdentityMatcher::new(ctx.clone()),
            resolver: Arc::new(DuplicateResolver::new(ctx.clone())),
            sweep: Arc::new(PendingSweep::new(ctx.clone())),
            editor: MemberEditor::new(ctx.clone()),
            reconciler: Reconciler::new(ctx.clone()),
            scans: ScanRegistry::new(jobs),
            ctx,
        })
    }

    /// Engine whose index, ledger, albums and scan records all live in
    /// `store`.
    pub fn with_store(cfg: ResolveConfig, store: Arc<dyn KVStore>) -> Result<Self> {
        let cfg = cfg.with_defaults();
        let index = StoreIndex::new(store.clone()).with_dim(cfg.dim);
        Self::new(
            cfg,
            Arc::new(index),
            Arc::new(KvReviewLedger::new(store.clone())),
            Arc::new(KvIdentityStore::new(store.clone())),
            Arc::new(KvJobStore::new(store)),
        )
    }

    pub fn config(&self) -> &ResolveConfig {
        &self.ctx.cfg
    }

    // -----------------------------------------------------------------------
    // Interactive path
    // -----------------------------------------------------------------------

    /// Resolve one detected face: confirm it when it matches an identity,
    /// otherwise queue it for review with the best candidate as suggestion.
    pub async fn submit_face(&self, face: DetectedFace) -> Result<SubmitOutcome> {
        self.check_dim(&face.vector)?;
        if let Some(found) = self.matcher.match_face(&face.vector, face.gender).await {
            let duplicates = self.resolver.accept_detected(&face, &found, true).await?;
            info!(face = %face.id, identity = %found.identity_id, score = found.score, "face matched");
            return Ok(SubmitOutcome::Matched { found, duplicates });
        }

        let suggestion = self.matcher.best_candidate(&face.vector, face.gender).await;
        let entry = ReviewEntry::singleton(face).with_suggestion(suggestion.as_ref());
        self.ctx.insert_review(&entry).await?;
        self.ctx.upsert_pending(&entry).await?;
        info!(review = %entry.id, "face queued for review");
        Ok(SubmitOutcome::Pending {
            review_id: entry.id,
            suggestion,
        })
    }

    /// Best identity for a vector, if any reaches the match threshold.
    pub async fn best_match(&self, face: &DetectedFace) -> Result<Option<IdentityMatch>> {
        self.check_dim(&face.vector)?;
        Ok(self.matcher.match_face(&face.vector, face.gender).await)
    }

    pub async fn accept(
        &self,
        review_id: &str,
        identity_id: &str,
        display_name: Option<&str>,
    ) -> Result<AcceptOutcome> {
        self.resolver
            .on_accepted(review_id, identity_id, display_name)
            .await
    }

    pub async fn reject(&self, review_id: &str) -> Result<ReviewEntry> {
        self.resolver.reject(review_id).await
    }

    pub async fn remove_member(&self, review_id: &str, member_id: &str) -> Result<RemoveOutcome> {
        self.editor.remove_member(review_id, member_id).await
    }

    pub async fn sweep(&self, identity_id: &str, cancel: &CancellationToken) -> Result<SweepReport> {
        self.sweep.sweep(identity_id, cancel).await
    }

    pub async fn reconcile(&self, cancel: &CancellationToken) -> Result<ReconcileReport> {
        self.reconciler.run(cancel).await
    }

    // -----------------------------------------------------------------------
    // Scans
    // -----------------------------------------------------------------------

    /// Start a background scan. Must be called inside a tokio runtime.
    pub fn start_scan(&self, source: Arc<dyn FaceSource>) -> String {
        self.scans.start(
            self.ctx.clone(),
            self.resolver.clone(),
            self.sweep.clone(),
            source,
        )
    }

    pub async fn scan_status(&self, scan_id: &str) -> Result<Option<ScanStatus>> {
        self.scans.status(scan_id).await
    }

    pub fn cancel_scan(&self, scan_id: &str) -> bool {
        self.scans.cancel(scan_id)
    }

    pub async fn wait_scan(&self, scan_id: &str) -> Result<Option<ScanStatus>> {
        self.scans.wait(scan_id).await
    }

    /// Every recorded scan, oldest first, including finished ones.
    pub async fn list_scans(&self) -> Result<Vec<ScanStatus>> {
        self.scans.list().await
    }

    /// Number of scans started by this engine that are still running.
    pub fn running_scans(&self) -> usize {
        self.scans.running()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn list_pending(&self, limit: usize) -> Result<Vec<ReviewEntry>> {
        self.ctx.pending_batch(0, limit).await
    }

    pub async fn review(&self, review_id: &str) -> Result<Option<ReviewEntry>> {
        self.ctx.review(review_id).await
    }

    pub async fn identity(&self, identity_id: &str) -> Result<Option<Identity>> {
        self.ctx.albums.get(identity_id).await
    }

    pub async fn identity_cluster(&self, identity_id: &str) -> Result<Option<IdentityCluster>> {
        self.ctx.albums.cluster(identity_id).await
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.ctx.cfg.dim {
            return Err(ResolveError::DimensionMismatch {
                expected: self.ctx.cfg.dim,
                got: vector.len(),
            });
        }
        Ok(())
    }
}
