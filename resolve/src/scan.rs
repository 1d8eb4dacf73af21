use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use facelink_vecid::{ClusterBuilder, Config as ClusterConfig};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::duplicate::DuplicateResolver;
use crate::error::{ResolveError, Result};
use crate::jobs::JobStore;
use crate::matcher::IdentityMatcher;
use crate::sweep::PendingSweep;
use crate::types::{DetectedFace, ReviewEntry, ScanState, ScanStatus, new_id};

/// Produces detected faces for a bulk scan.
#[async_trait]
pub trait FaceSource: Send + Sync {
    /// Every image to scan, in processing order. A failure aborts the scan.
    async fn images(&self) -> Result<Vec<String>>;

    /// Faces detected in one image. A failure skips that image.
    async fn faces(&self, image_id: &str) -> Result<Vec<DetectedFace>>;
}

struct LiveScan {
    status: watch::Receiver<ScanStatus>,
    cancel: CancellationToken,
}

/// Scans that have not reached a terminal state, by id.
type LiveScans = Arc<Mutex<HashMap<String, LiveScan>>>;

/// Tracks running scans. Progress is published on a watch channel and
/// persisted to the [JobStore] after every image. A scan leaves the live set
/// once its final state is persisted; from then on it is served from the
/// job store.
pub struct ScanRegistry {
    live: LiveScans,
    jobs: Arc<dyn JobStore>,
}

impl ScanRegistry {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self {
            live: Arc::new(Mutex::new(HashMap::new())),
            jobs,
        }
    }

    /// Spawn a scan over `source` and return its id immediately.
    pub(crate) fn start(
        &self,
        ctx: Arc<Context>,
        resolver: Arc<DuplicateResolver>,
        sweep: Arc<PendingSweep>,
        source: Arc<dyn FaceSource>,
    ) -> String {
        let scan_id = new_id();
        let (tx, rx) = watch::channel(ScanStatus::started(&scan_id));
        let cancel = CancellationToken::new();
        self.live.lock().expect("lock poisoned").insert(
            scan_id.clone(),
            LiveScan {
                status: rx,
                cancel: cancel.clone(),
            },
        );

        let task = ScanTask {
            matcher: IdentityMatcher::new(ctx.clone()),
            ctx,
            resolver,
            sweep,
            source,
            jobs: self.jobs.clone(),
            live: self.live.clone(),
            tx,
            cancel,
        };
        info!(scan = %scan_id, "scan started");
        tokio::spawn(task.run());
        scan_id
    }

    /// Latest progress, from the live channel or else the job store.
    pub async fn status(&self, scan_id: &str) -> Result<Option<ScanStatus>> {
        if let Some(status) = self.live_status(scan_id) {
            return Ok(Some(status));
        }
        self.jobs.load(scan_id).await
    }

    /// Every recorded scan, oldest first.
    pub async fn list(&self) -> Result<Vec<ScanStatus>> {
        self.jobs.list().await
    }

    /// Number of scans still running.
    pub fn running(&self) -> usize {
        self.live.lock().expect("lock poisoned").len()
    }

    /// Request cancellation. Returns false for unknown or finished scans.
    pub fn cancel(&self, scan_id: &str) -> bool {
        let live = self.live.lock().expect("lock poisoned");
        match live.get(scan_id) {
            Some(scan) if !scan.status.borrow().state.is_terminal() => {
                scan.cancel.cancel();
                info!(scan = scan_id, "scan cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Wait until the scan reaches a terminal state.
    pub async fn wait(&self, scan_id: &str) -> Result<Option<ScanStatus>> {
        let rx = {
            let live = self.live.lock().expect("lock poisoned");
            live.get(scan_id).map(|s| s.status.clone())
        };
        let Some(mut rx) = rx else {
            return self.jobs.load(scan_id).await;
        };
        let done = rx
            .wait_for(|s| s.state.is_terminal())
            .await
            .map(|s| s.clone());
        if let Ok(status) = done {
            return Ok(Some(status));
        }
        match self.jobs.load(scan_id).await? {
            Some(status) if status.state.is_terminal() => Ok(Some(status)),
            _ => Err(ResolveError::Scan(format!(
                "scan {scan_id} stopped without reporting a final state"
            ))),
        }
    }

    fn live_status(&self, scan_id: &str) -> Option<ScanStatus> {
        let live = self.live.lock().expect("lock poisoned");
        live.get(scan_id).map(|s| s.status.borrow().clone())
    }
}

struct ScanTask {
    ctx: Arc<Context>,
    matcher: IdentityMatcher,
    resolver: Arc<DuplicateResolver>,
    sweep: Arc<PendingSweep>,
    source: Arc<dyn FaceSource>,
    jobs: Arc<dyn JobStore>,
    live: LiveScans,
    tx: watch::Sender<ScanStatus>,
    cancel: CancellationToken,
}

impl ScanTask {
    async fn run(self) {
        let mut status = self.tx.borrow().clone();
        self.publish(&status).await;

        let images = match self.source.images().await {
            Ok(images) => images,
            Err(e) => {
                warn!(scan = %status.scan_id, error = %e, "scan: listing images failed");
                status.error = Some(e.to_string());
                self.finish(status, ScanState::Error).await;
                return;
            }
        };

        let mut builder = ClusterBuilder::<DetectedFace>::new(ClusterConfig {
            dim: self.ctx.cfg.dim,
            threshold: self.ctx.cfg.cluster_threshold,
        });
        let mut matched: Vec<String> = Vec::new();
        let mut cancelled = false;

        for image_id in &images {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match self.source.faces(image_id).await {
                Ok(faces) => {
                    for face in faces {
                        self.process_face(image_id, face, &mut builder, &mut matched, &mut status)
                            .await;
                    }
                }
                Err(e) => {
                    warn!(scan = %status.scan_id, image = %image_id, error = %e, "scan: image skipped");
                    status.skipped += 1;
                }
            }
            status.files += 1;
            self.publish(&status).await;
        }

        // Clusters built so far are kept even when the scan was cancelled.
        for cluster in builder.finish() {
            let centroid = cluster.centroid();
            let faces = cluster.into_members();
            let face_count = faces.len();
            let gender = faces.iter().find_map(|f| f.gender);
            let suggestion = self.matcher.best_candidate(&centroid, gender).await;
            let entry = ReviewEntry::cluster(centroid, faces).with_suggestion(suggestion.as_ref());
            match self.materialize(&entry).await {
                Ok(()) => status.reviews += 1,
                Err(e) => {
                    warn!(scan = %status.scan_id, error = %e, "scan: cluster review not written");
                    status.skipped += face_count;
                }
            }
        }
        self.publish(&status).await;

        if !cancelled {
            for identity_id in &matched {
                if let Err(e) = self.sweep.sweep(identity_id, &self.cancel).await {
                    warn!(scan = %status.scan_id, identity = %identity_id, error = %e, "scan: sweep failed");
                }
            }
        }

        let state = if cancelled || self.cancel.is_cancelled() {
            ScanState::Cancelled
        } else {
            ScanState::Completed
        };
        self.finish(status, state).await;
    }

    async fn process_face(
        &self,
        image_id: &str,
        mut face: DetectedFace,
        builder: &mut ClusterBuilder<DetectedFace>,
        matched: &mut Vec<String>,
        status: &mut ScanStatus,
    ) {
        status.faces += 1;
        if face.image_id.is_empty() {
            face.image_id = image_id.to_string();
        }
        if face.vector.len() != self.ctx.cfg.dim {
            warn!(
                scan = %status.scan_id,
                face = %face.id,
                got = face.vector.len(),
                expected = self.ctx.cfg.dim,
                "scan: face skipped, dimension mismatch"
            );
            status.skipped += 1;
            return;
        }

        if let Some(found) = self.matcher.match_face(&face.vector, face.gender).await {
            match self.resolver.accept_detected(&face, &found, false).await {
                Ok(_) => {
                    status.matches += 1;
                    if !matched.contains(&found.identity_id) {
                        matched.push(found.identity_id);
                    }
                }
                Err(e) => {
                    warn!(scan = %status.scan_id, face = %face.id, error = %e, "scan: match not applied");
                    status.skipped += 1;
                }
            }
            return;
        }

        let vector = face.vector.clone();
        match builder.assign(&vector, face) {
            Ok(a) => debug!(cluster = a.cluster.0, opened = a.opened, "scan: face clustered"),
            Err(e) => {
                warn!(scan = %status.scan_id, error = %e, "scan: face not clustered");
                status.skipped += 1;
            }
        }
    }

    async fn materialize(&self, entry: &ReviewEntry) -> Result<()> {
        self.ctx.insert_review(entry).await?;
        self.ctx.upsert_pending(entry).await
    }

    async fn finish(&self, mut status: ScanStatus, state: ScanState) {
        status.state = state;
        status.finished_at = Some(Utc::now());
        info!(
            scan = %status.scan_id,
            state = %status.state,
            files = status.files,
            faces = status.faces,
            matches = status.matches,
            reviews = status.reviews,
            skipped = status.skipped,
            "scan finished"
        );
        // Persist, unregister, then notify: a reader that no longer finds
        // the scan live finds its final state in the job store.
        if let Err(e) = self.jobs.save(&status).await {
            warn!(scan = %status.scan_id, error = %e, "scan: final state not persisted");
        }
        self.live
            .lock()
            .expect("lock poisoned")
            .remove(&status.scan_id);
        self.tx.send_replace(status);
    }

    async fn publish(&self, status: &ScanStatus) {
        self.tx.send_replace(status.clone());
        if let Err(e) = self.jobs.save(status).await {
            warn!(scan = %status.scan_id, error = %e, "scan: progress not persisted");
        }
    }
}
