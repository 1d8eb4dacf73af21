use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use facelink_kv::{KVStore, MemoryStore};
use facelink_vecstore::{
    Filter, Point, PointPayload, ScoredPoint, ScrollPage, SimilarityClient, StoreIndex, VecError,
};
use tokio_util::sync::CancellationToken;

use crate::album::KvIdentityStore;
use crate::config::{ResolveConfig, RetryConfig};
use crate::context::pending_point;
use crate::engine::Engine;
use crate::error::{ResolveError, Result};
use crate::jobs::KvJobStore;
use crate::ledger::{KvReviewLedger, ReviewLedger};
use crate::scan::FaceSource;
use crate::types::{
    DetectedFace, RemoveOutcome, Resolution, ReviewEntry, ScanState, SubmitOutcome, SweepReport,
};

// ---------------------------------------------------------------------------
// Test index
// ---------------------------------------------------------------------------

/// Wraps a [StoreIndex]. Scores can be pinned per point id, searches can be
/// made to fail transiently a number of times, and searches for poisoned
/// vectors always fail.
struct TestIndex {
    inner: StoreIndex,
    scores: Mutex<HashMap<String, f32>>,
    transient: AtomicU32,
    poisoned: Mutex<Vec<Vec<f32>>>,
    searches: AtomicU32,
}

impl TestIndex {
    fn new(inner: StoreIndex) -> Self {
        Self {
            inner,
            scores: Mutex::new(HashMap::new()),
            transient: AtomicU32::new(0),
            poisoned: Mutex::new(Vec::new()),
            searches: AtomicU32::new(0),
        }
    }

    fn set_score(&self, point_id: &str, score: f32) {
        self.scores.lock().unwrap().insert(point_id.to_string(), score);
    }

    fn fail_next(&self, n: u32) {
        self.transient.store(n, Ordering::SeqCst);
    }

    fn poison(&self, vector: [f32; 4]) {
        self.poisoned.lock().unwrap().push(vector.to_vec());
    }
}

#[async_trait]
impl SimilarityClient for TestIndex {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> std::result::Result<Vec<ScoredPoint>, VecError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self
            .transient
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(VecError::Unavailable("injected".into()));
        }
        let poisoned = self.poisoned.lock().unwrap().iter().any(|p| p == vector);
        if poisoned {
            return Err(VecError::Io("poisoned vector".into()));
        }

        let mut hits = self.inner.search(collection, vector, usize::MAX, filter).await?;
        {
            let scores = self.scores.lock().unwrap();
            for hit in &mut hits {
                if let Some(s) = scores.get(&hit.id) {
                    hit.score = *s;
                }
            }
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> std::result::Result<(), VecError> {
        self.inner.upsert(collection, points).await
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        offset: Option<&str>,
        limit: usize,
        with_vectors: bool,
    ) -> std::result::Result<ScrollPage, VecError> {
        self.inner
            .scroll(collection, filter, offset, limit, with_vectors)
            .await
    }

    async fn get(&self, collection: &str, id: &str) -> std::result::Result<Option<Point>, VecError> {
        self.inner.get(collection, id).await
    }
}

// ---------------------------------------------------------------------------
// Face source
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemorySource {
    images: Vec<(String, Vec<DetectedFace>)>,
    broken: HashSet<String>,
    unlistable: bool,
}

impl MemorySource {
    fn image(mut self, image_id: &str, faces: Vec<DetectedFace>) -> Self {
        self.images.push((image_id.to_string(), faces));
        self
    }
}

#[async_trait]
impl FaceSource for MemorySource {
    async fn images(&self) -> Result<Vec<String>> {
        if self.unlistable {
            return Err(ResolveError::Scan("library offline".into()));
        }
        Ok(self.images.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn faces(&self, image_id: &str) -> Result<Vec<DetectedFace>> {
        if self.broken.contains(image_id) {
            return Err(ResolveError::Scan(format!("cannot decode {image_id}")));
        }
        Ok(self
            .images
            .iter()
            .find(|(id, _)| id == image_id)
            .map(|(_, faces)| faces.clone())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

const E0: [f32; 4] = [1.0, 0.0, 0.0, 0.0];
const E1: [f32; 4] = [0.0, 1.0, 0.0, 0.0];
const E2: [f32; 4] = [0.0, 0.0, 1.0, 0.0];
const E3: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Unit vector whose cosine similarity with [E0] is `c`.
fn near_e0(c: f32) -> [f32; 4] {
    [c, (1.0 - c * c).sqrt(), 0.0, 0.0]
}

fn face(id: &str, image_id: &str, v: [f32; 4]) -> DetectedFace {
    DetectedFace {
        id: id.into(),
        image_id: image_id.into(),
        vector: v.to_vec(),
        bbox: None,
        thumbnail: Some(format!("thumbs/{id}.jpg")),
        gender: None,
    }
}

fn test_config() -> ResolveConfig {
    ResolveConfig {
        dim: 4,
        sweep_batch_size: 2,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            timeout_ms: 1_000,
        },
        ..Default::default()
    }
}

struct Harness {
    engine: Engine,
    index: Arc<TestIndex>,
    ledger: Arc<KvReviewLedger>,
    cfg: ResolveConfig,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(test_config())
    }

    fn with_config(cfg: ResolveConfig) -> Self {
        let store: Arc<dyn KVStore> = Arc::new(MemoryStore::new());
        let index = Arc::new(TestIndex::new(StoreIndex::new(store.clone()).with_dim(cfg.dim)));
        let ledger = Arc::new(KvReviewLedger::new(store.clone()));
        let engine = Engine::new(
            cfg.clone(),
            index.clone(),
            ledger.clone(),
            Arc::new(KvIdentityStore::new(store.clone())),
            Arc::new(KvJobStore::new(store)),
        )
        .unwrap();
        Self {
            engine,
            index,
            ledger,
            cfg,
        }
    }

    /// Write a pending review to the ledger and the pending collection.
    async fn queue(&self, entry: &ReviewEntry) {
        self.ledger.insert(entry).await.unwrap();
        self.index
            .upsert(&self.cfg.pending_collection, vec![pending_point(entry)])
            .await
            .unwrap();
    }

    async fn confirm(&self, point_id: &str, identity_id: &str, v: [f32; 4]) {
        self.index
            .upsert(
                &self.cfg.confirmed_collection,
                vec![Point::new(point_id, v.to_vec(), PointPayload::confirmed(identity_id))],
            )
            .await
            .unwrap();
    }

    async fn entry(&self, id: &str) -> ReviewEntry {
        self.engine.review(id).await.unwrap().unwrap()
    }

    async fn pending_point(&self, id: &str) -> Option<Point> {
        self.index.get(&self.cfg.pending_collection, id).await.unwrap()
    }

    async fn pending_faces(&self) -> usize {
        self.engine
            .list_pending(1_000)
            .await
            .unwrap()
            .iter()
            .map(|e| e.face_count())
            .sum()
    }
}

fn just_below(t: f32) -> f32 {
    f32::from_bits(t.to_bits() - 1)
}

// ---------------------------------------------------------------------------
// Duplicate resolver
// ---------------------------------------------------------------------------

#[tokio::test]
async fn group_propagation_accepts_every_member() {
    let h = Harness::new();
    let mut ids = Vec::new();
    for (i, v) in [E0, E1, E2].into_iter().enumerate() {
        let mut e = ReviewEntry::singleton(face(&format!("f{i}"), &format!("img{i}"), v));
        e.group_id = Some("g1".into());
        h.queue(&e).await;
        ids.push(e.id);
    }

    let out = h.engine.accept(&ids[0], "alice", Some("Alice")).await.unwrap();
    assert_eq!(out.group_mates.len(), 2);
    assert!(out.duplicates.is_empty());

    for id in &ids {
        let e = h.entry(id).await;
        assert_eq!(e.identity_id(), Some("alice"), "entry {id}");
        assert!(h.pending_point(id).await.unwrap().payload.resolved);
    }
    let alice = h.engine.identity("alice").await.unwrap().unwrap();
    assert_eq!(alice.display_name, "Alice");
    assert_eq!(alice.face_count, 3);
    assert_eq!(alice.image_count, 3);
    assert_eq!(alice.dominant_cluster.as_deref(), Some("alice"));
    assert!(h.engine.list_pending(10).await.unwrap().is_empty());
}

async fn accept_with_neighbour_score(score: f32) -> (Vec<String>, ReviewEntry) {
    let h = Harness::new();
    let a = ReviewEntry::singleton(face("fa", "img1", E0));
    let b = ReviewEntry::singleton(face("fb", "img2", E1));
    h.queue(&a).await;
    h.queue(&b).await;
    h.index.set_score(&b.id, score);

    let out = h.engine.accept(&a.id, "alice", None).await.unwrap();
    (out.duplicates, h.entry(&b.id).await)
}

#[tokio::test]
async fn duplicate_at_auto_resolve_threshold_is_resolved() {
    let (duplicates, b) = accept_with_neighbour_score(0.49).await;
    assert_eq!(duplicates, vec![b.id.clone()]);
    assert_eq!(b.identity_id(), Some("alice"));
}

#[tokio::test]
async fn duplicate_below_auto_resolve_threshold_stays_pending() {
    let (duplicates, b) = accept_with_neighbour_score(0.4899).await;
    assert!(duplicates.is_empty());
    assert!(!b.resolved());
    // The sweep after acceptance still leaves a suggestion behind.
    assert_eq!(b.suggested_identity_id.as_deref(), Some("alice"));
}

#[tokio::test]
async fn accept_preconditions() {
    let h = Harness::new();
    let err = h.engine.accept("missing", "alice", None).await.unwrap_err();
    assert!(matches!(err, ResolveError::ReviewNotFound(_)));

    let a = ReviewEntry::singleton(face("f1", "img1", E0));
    h.queue(&a).await;
    h.engine.accept(&a.id, "alice", None).await.unwrap();
    let err = h.engine.accept(&a.id, "bob", None).await.unwrap_err();
    assert!(matches!(err, ResolveError::AlreadyResolved(_)));
    assert_eq!(h.entry(&a.id).await.identity_id(), Some("alice"));

    let mut empty = ReviewEntry::singleton(face("f2", "img2", E1));
    empty.vector.clear();
    h.ledger.insert(&empty).await.unwrap();
    let err = h.engine.accept(&empty.id, "alice", None).await.unwrap_err();
    assert!(matches!(err, ResolveError::MissingVector(_)));
    assert!(err.is_invariant_violation());
    assert!(!h.entry(&empty.id).await.resolved());
}

#[tokio::test]
async fn accept_requires_an_identity_id() {
    let h = Harness::new();
    let a = ReviewEntry::singleton(face("f1", "img1", E0));
    h.queue(&a).await;

    let err = h.engine.accept(&a.id, "", Some("Nobody")).await.unwrap_err();
    assert!(matches!(err, ResolveError::EmptyIdentity));
    assert!(err.is_invariant_violation());
    assert!(!h.entry(&a.id).await.resolved());
    assert!(!h.pending_point(&a.id).await.unwrap().payload.resolved);
    assert!(h.engine.identity("").await.unwrap().is_none());

    h.engine.accept(&a.id, "alice", None).await.unwrap();
    assert_eq!(h.entry(&a.id).await.identity_id(), Some("alice"));
}

#[tokio::test]
async fn concurrent_accepts_resolve_once() {
    let h = Harness::new();
    let a = ReviewEntry::singleton(face("f1", "img1", E0));
    h.queue(&a).await;

    let (r1, r2) = tokio::join!(
        h.engine.accept(&a.id, "alice", None),
        h.engine.accept(&a.id, "bob", None),
    );
    let (winner, loser) = match (&r1, &r2) {
        (Ok(_), Err(ResolveError::AlreadyResolved(_))) => ("alice", "bob"),
        (Err(ResolveError::AlreadyResolved(_)), Ok(_)) => ("bob", "alice"),
        other => panic!("expected exactly one acceptance, got {other:?}"),
    };
    assert_eq!(h.entry(&a.id).await.identity_id(), Some(winner));
    assert_eq!(h.engine.identity(winner).await.unwrap().unwrap().face_count, 1);
    assert!(h.engine.identity(loser).await.unwrap().is_none());
}

#[tokio::test]
async fn reject_does_not_propagate() {
    let h = Harness::new();
    let a = ReviewEntry::singleton(face("f1", "img1", E0));
    let twin = ReviewEntry::singleton(face("f2", "img2", E0));
    h.queue(&a).await;
    h.queue(&twin).await;

    let rejected = h.engine.reject(&a.id).await.unwrap();
    assert!(rejected.rejected());
    assert!(h.pending_point(&a.id).await.unwrap().payload.resolved);
    assert!(!h.entry(&twin.id).await.resolved());

    let err = h.engine.reject(&a.id).await.unwrap_err();
    assert!(matches!(err, ResolveError::AlreadyResolved(_)));
}

// ---------------------------------------------------------------------------
// Identity matcher via submit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn match_threshold_is_inclusive() {
    let h = Harness::new();
    h.confirm("alice-1", "alice", E0).await;
    h.index.set_score("alice-1", 0.72);

    match h.engine.submit_face(face("f1", "img1", E1)).await.unwrap() {
        SubmitOutcome::Matched { found, .. } => {
            assert_eq!(found.identity_id, "alice");
            assert_eq!(found.score, 0.72);
        }
        other => panic!("expected a match, got {other:?}"),
    }
    let alice = h.engine.identity("alice").await.unwrap().unwrap();
    assert_eq!(alice.face_count, 1);
}

#[tokio::test]
async fn one_ulp_below_match_threshold_is_queued() {
    let h = Harness::new();
    h.confirm("alice-1", "alice", E0).await;
    let score = just_below(0.72);
    h.index.set_score("alice-1", score);

    let review_id = match h.engine.submit_face(face("f1", "img1", E1)).await.unwrap() {
        SubmitOutcome::Pending { review_id, suggestion } => {
            let s = suggestion.unwrap();
            assert_eq!(s.identity_id, "alice");
            assert_eq!(s.score, score);
            review_id
        }
        other => panic!("expected a pending review, got {other:?}"),
    };
    let e = h.entry(&review_id).await;
    assert_eq!(e.face_count(), 1);
    assert_eq!(e.suggested_identity_id.as_deref(), Some("alice"));
    assert!(h.pending_point(&review_id).await.is_some());
}

#[tokio::test]
async fn submit_rejects_wrong_dimension() {
    let h = Harness::new();
    let mut f = face("f1", "img1", E0);
    f.vector.push(0.0);
    let err = h.engine.submit_face(f).await.unwrap_err();
    assert!(matches!(err, ResolveError::DimensionMismatch { expected: 4, got: 5 }));
}

#[tokio::test]
async fn transient_search_failures_are_retried() {
    let h = Harness::new();
    h.confirm("alice-1", "alice", E0).await;
    h.index.fail_next(2);

    let out = h.engine.submit_face(face("f1", "img1", E0)).await.unwrap();
    assert!(matches!(out, SubmitOutcome::Matched { .. }));
    assert!(h.index.searches.load(Ordering::SeqCst) >= 3);
}

// ---------------------------------------------------------------------------
// Pending sweep
// ---------------------------------------------------------------------------

async fn sweep_with_candidate_score(score: f32) -> (SweepReport, ReviewEntry) {
    let h = Harness::new();
    let r = ReviewEntry::singleton(face("f1", "img1", E1));
    h.queue(&r).await;
    h.confirm("alice-1", "alice", E0).await;
    h.index.set_score("alice-1", score);

    let report = h
        .engine
        .sweep("alice", &CancellationToken::new())
        .await
        .unwrap();
    (report, h.entry(&r.id).await)
}

#[tokio::test]
async fn sweep_resolves_at_auto_resolve_threshold() {
    let (report, e) = sweep_with_candidate_score(0.49).await;
    assert_eq!(report.resolved, 1);
    assert_eq!(e.identity_id(), Some("alice"));
}

#[tokio::test]
async fn sweep_only_suggests_below_threshold() {
    let (report, e) = sweep_with_candidate_score(0.4899).await;
    assert_eq!(report.resolved, 0);
    assert_eq!(report.suggested, 1);
    assert!(!e.resolved());
    assert_eq!(e.suggested_identity_id.as_deref(), Some("alice"));
    assert_eq!(e.suggested_score, Some(0.4899));
}

#[tokio::test]
async fn sweep_twice_changes_nothing_the_second_time() {
    let h = Harness::new();
    h.confirm("alice-1", "alice", E0).await;
    let near = ReviewEntry::singleton(face("f1", "img1", near_e0(0.8)));
    let far = ReviewEntry::singleton(face("f2", "img2", E2));
    h.queue(&near).await;
    h.queue(&far).await;

    let cancel = CancellationToken::new();
    let first = h.engine.sweep("alice", &cancel).await.unwrap();
    assert_eq!(first.scanned, 2);
    assert_eq!(first.resolved, 1);
    assert_eq!(first.suggested, 1);

    let second = h.engine.sweep("alice", &cancel).await.unwrap();
    assert_eq!(second.scanned, 1);
    assert_eq!(second.resolved, 0);
    assert_eq!(second.suggested, 0);
    assert_eq!(h.entry(&near.id).await.identity_id(), Some("alice"));
    assert!(!h.entry(&far.id).await.resolved());
}

#[tokio::test]
async fn sweep_pages_past_entries_that_stay_pending() {
    let h = Harness::new();
    h.confirm("alice-1", "alice", E0).await;
    // Batch size is 2; interleave entries that resolve with ones that stay.
    let mut near = Vec::new();
    for i in 0..3 {
        let n = ReviewEntry::singleton(face(&format!("n{i}"), "img", near_e0(0.9)));
        let f = ReviewEntry::singleton(face(&format!("x{i}"), "img", E3));
        h.queue(&n).await;
        h.queue(&f).await;
        near.push(n.id);
    }

    let report = h
        .engine
        .sweep("alice", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.scanned, 6);
    assert_eq!(report.resolved, 3);
    for id in &near {
        assert!(h.entry(id).await.accepted());
    }
    assert_eq!(h.engine.list_pending(100).await.unwrap().len(), 3);
}

#[tokio::test]
async fn sweep_skips_failed_entries() {
    let h = Harness::new();
    h.confirm("alice-1", "alice", E0).await;
    let good = ReviewEntry::singleton(face("f1", "img1", near_e0(0.8)));
    let bad = ReviewEntry::singleton(face("f2", "img2", near_e0(0.9)));
    h.queue(&good).await;
    h.queue(&bad).await;
    h.index.poison(near_e0(0.9));

    let report = h
        .engine
        .sweep("alice", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.resolved, 1);
    assert_eq!(report.skipped, 1);
    assert!(h.entry(&good.id).await.accepted());
    assert!(!h.entry(&bad.id).await.resolved());
}

#[tokio::test]
async fn sweep_passes_over_entries_without_a_vector() {
    let h = Harness::new();
    h.confirm("alice-1", "alice", E0).await;
    let mut blank = ReviewEntry::singleton(face("f1", "img1", E0));
    blank.vector.clear();
    h.ledger.insert(&blank).await.unwrap();
    let near = ReviewEntry::singleton(face("f2", "img2", near_e0(0.8)));
    h.queue(&near).await;

    let report = h
        .engine
        .sweep("alice", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.resolved, 1);
    assert_eq!(report.skipped, 0);
    let blank = h.entry(&blank.id).await;
    assert!(!blank.resolved());
    assert!(blank.suggested_identity_id.is_none());
}

#[tokio::test]
async fn cancelled_sweep_stops_before_first_batch() {
    let h = Harness::new();
    h.queue(&ReviewEntry::singleton(face("f1", "img1", E0))).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = h.engine.sweep("alice", &cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.scanned, 0);
}

// ---------------------------------------------------------------------------
// Member editor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remove_member_conserves_faces() {
    let h = Harness::new();
    let faces = vec![
        face("f1", "img1", E0),
        face("f2", "img2", near_e0(0.8)),
        face("f3", "img3", near_e0(0.9)),
    ];
    let vectors: Vec<Vec<f32>> = faces.iter().map(|f| f.vector.clone()).collect();
    let centroid = facelink_vecid::mean_vector(&vectors).unwrap();
    let cluster = ReviewEntry::cluster(centroid, faces);
    h.queue(&cluster).await;
    assert_eq!(h.pending_faces().await, 3);

    let RemoveOutcome::Moved { new_review_id, original_rejected } =
        h.engine.remove_member(&cluster.id, "f2").await.unwrap()
    else {
        panic!("member should have moved");
    };
    assert!(!original_rejected);
    assert_eq!(h.pending_faces().await, 3);

    let parent = h.entry(&cluster.id).await;
    let ids: Vec<_> = parent.members.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["f1", "f3"]);
    let expected = facelink_vecid::mean_vector(&[E0, near_e0(0.9)]).unwrap();
    for (got, want) in parent.vector.iter().zip(&expected) {
        assert!((got - want).abs() < 1e-6);
    }
    assert_eq!(parent.thumbnail.as_deref(), Some("thumbs/f1.jpg"));
    assert_eq!(h.pending_point(&cluster.id).await.unwrap().vector, parent.vector);

    let moved = h.entry(&new_review_id).await;
    assert_eq!(moved.members.len(), 1);
    assert_eq!(moved.members[0].id, "f2");
    assert_eq!(moved.vector, near_e0(0.8).to_vec());
    assert_ne!(moved.group_id, parent.group_id);
    assert!(h.pending_point(&new_review_id).await.is_some());

    assert_eq!(
        h.engine.remove_member(&cluster.id, "nope").await.unwrap(),
        RemoveOutcome::MemberNotFound
    );

    h.engine.remove_member(&cluster.id, "f1").await.unwrap();
    let last = h.engine.remove_member(&cluster.id, "f3").await.unwrap();
    assert!(matches!(last, RemoveOutcome::Moved { original_rejected: true, .. }));
    assert!(h.entry(&cluster.id).await.rejected());
    assert!(h.pending_point(&cluster.id).await.unwrap().payload.resolved);
    assert_eq!(h.pending_faces().await, 3);
    assert_eq!(h.engine.list_pending(100).await.unwrap().len(), 3);

    let err = h.engine.remove_member("missing", "f1").await.unwrap_err();
    assert!(matches!(err, ResolveError::ReviewNotFound(_)));
}

#[tokio::test]
async fn moved_member_gets_a_suggestion() {
    let h = Harness::new();
    h.confirm("bob-1", "bob", E2).await;
    let cluster = ReviewEntry::cluster(
        vec![0.5, 0.0, 0.5, 0.0],
        vec![face("f1", "img1", E0), face("f2", "img2", E2)],
    );
    h.queue(&cluster).await;

    let RemoveOutcome::Moved { new_review_id, .. } =
        h.engine.remove_member(&cluster.id, "f2").await.unwrap()
    else {
        panic!("member should have moved");
    };
    let moved = h.entry(&new_review_id).await;
    assert_eq!(moved.suggested_identity_id.as_deref(), Some("bob"));
}

// ---------------------------------------------------------------------------
// Scans
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scan_clusters_unmatched_faces() {
    let h = Harness::new();
    // Two tight groups plus one face at ~0.3 to the first group.
    let vs: [[f32; 4]; 12] = [
        [1.0, 0.0, 0.0, 0.0],
        [0.8, 0.6, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.9, 0.4359, 0.0, 0.0],
        [0.0, 0.0, 0.8, 0.6],
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.9, 0.4359],
        [0.8, -0.6, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.3, 0.0, 0.0, 0.9539],
        [0.95, 0.3122, 0.0, 0.0],
        [0.0, 0.0, 0.8, -0.6],
    ];
    let mut source = MemorySource::default();
    let mut it = vs.iter().enumerate();
    for img in 0..10 {
        let per_image = if img < 2 { 2 } else { 1 };
        let faces = (&mut it)
            .take(per_image)
            .map(|(i, v)| face(&format!("f{i}"), &format!("img{img}"), *v))
            .collect();
        source = source.image(&format!("img{img}"), faces);
    }

    let scan_id = h.engine.start_scan(Arc::new(source));
    let status = h.engine.wait_scan(&scan_id).await.unwrap().unwrap();
    assert_eq!(status.state, ScanState::Completed);
    assert_eq!(status.files, 10);
    assert_eq!(status.faces, 12);
    assert_eq!(status.matches, 0);
    assert_eq!(status.reviews, 3);
    assert_eq!(status.skipped, 0);
    assert!(status.finished_at.is_some());

    let pending = h.engine.list_pending(100).await.unwrap();
    assert_eq!(pending.len(), 3);
    let mut sizes: Vec<_> = pending.iter().map(|e| e.face_count()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, [1, 5, 6]);
    let groups: HashSet<_> = pending.iter().map(|e| e.group_id.clone()).collect();
    assert_eq!(groups.len(), 3);

    let persisted = h.engine.scan_status(&scan_id).await.unwrap().unwrap();
    assert_eq!(persisted, status);
}

#[tokio::test]
async fn zero_cluster_threshold_groups_weakly_similar_faces() {
    let h = Harness::with_config(ResolveConfig {
        cluster_threshold: 0.0,
        ..test_config()
    });
    let source = MemorySource::default()
        .image("img1", vec![face("f1", "img1", E0)])
        .image("img2", vec![face("f2", "img2", near_e0(0.3))]);

    let scan_id = h.engine.start_scan(Arc::new(source));
    let status = h.engine.wait_scan(&scan_id).await.unwrap().unwrap();
    assert_eq!(status.state, ScanState::Completed);
    assert_eq!(status.reviews, 1);
    assert_eq!(h.pending_faces().await, 2);
}

#[tokio::test]
async fn scan_confirms_matches_and_resolves_duplicates() {
    let h = Harness::new();
    h.confirm("alice-1", "alice", E3).await;
    let old = ReviewEntry::singleton(face("old", "img0", [0.0, 0.0, 0.3, 0.9539]));
    h.queue(&old).await;

    let source = MemorySource::default()
        .image("img1", vec![face("f1", "img1", E3)])
        .image("img2", vec![face("f2", "img2", E0)])
        .image("img3", vec![face("f3", "img3", near_e0(0.9))]);
    let scan_id = h.engine.start_scan(Arc::new(source));
    let status = h.engine.wait_scan(&scan_id).await.unwrap().unwrap();

    assert_eq!(status.state, ScanState::Completed);
    assert_eq!(status.matches, 1);
    assert_eq!(status.reviews, 1);
    assert_eq!(h.entry(&old.id).await.identity_id(), Some("alice"));
    let alice = h.engine.identity("alice").await.unwrap().unwrap();
    assert_eq!(alice.face_count, 2);
    let cluster = h.engine.identity_cluster("alice").await.unwrap().unwrap();
    assert!(cluster.members.iter().any(|m| m.face_id == "f1"));
}

#[tokio::test]
async fn scan_skips_unreadable_images_and_bad_faces() {
    let h = Harness::new();
    let mut short = face("f3", "img2", E0);
    short.vector.pop();
    let mut source = MemorySource::default()
        .image("img1", vec![face("f1", "img1", E0)])
        .image("img2", vec![face("f2", "img2", E1), short]);
    source.broken.insert("img1".into());

    let scan_id = h.engine.start_scan(Arc::new(source));
    let status = h.engine.wait_scan(&scan_id).await.unwrap().unwrap();
    assert_eq!(status.state, ScanState::Completed);
    assert_eq!(status.files, 2);
    assert_eq!(status.faces, 2);
    assert_eq!(status.skipped, 2);
    assert_eq!(status.reviews, 1);
}

#[tokio::test]
async fn scan_errors_when_images_cannot_be_listed() {
    let h = Harness::new();
    let source = MemorySource {
        unlistable: true,
        ..Default::default()
    };
    let scan_id = h.engine.start_scan(Arc::new(source));
    let status = h.engine.wait_scan(&scan_id).await.unwrap().unwrap();
    assert_eq!(status.state, ScanState::Error);
    assert!(status.error.unwrap().contains("library offline"));
}

#[tokio::test]
async fn scan_can_be_cancelled() {
    let h = Harness::new();
    let source = MemorySource::default()
        .image("img1", vec![face("f1", "img1", E0)])
        .image("img2", vec![face("f2", "img2", E1)]);

    let scan_id = h.engine.start_scan(Arc::new(source));
    assert!(h.engine.cancel_scan(&scan_id));
    let status = h.engine.wait_scan(&scan_id).await.unwrap().unwrap();
    assert_eq!(status.state, ScanState::Cancelled);
    assert_eq!(status.files, 0);
    assert!(!h.engine.cancel_scan(&scan_id));
    assert!(!h.engine.cancel_scan("unknown"));
    assert!(h.engine.scan_status("unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn finished_scans_leave_the_running_set() {
    let h = Harness::new();
    let mut ids = Vec::new();
    for _ in 0..50 {
        let scan_id = h.engine.start_scan(Arc::new(MemorySource::default()));
        let status = h.engine.wait_scan(&scan_id).await.unwrap().unwrap();
        assert_eq!(status.state, ScanState::Completed);
        ids.push(scan_id);
    }
    assert_eq!(h.engine.running_scans(), 0);

    // Finished scans stay readable from the job store.
    let status = h.engine.scan_status(&ids[7]).await.unwrap().unwrap();
    assert_eq!(status.state, ScanState::Completed);
    let again = h.engine.wait_scan(&ids[7]).await.unwrap().unwrap();
    assert_eq!(again, status);
    assert_eq!(h.engine.list_scans().await.unwrap().len(), 50);
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconcile_repairs_index_after_partial_failure() {
    let h = Harness::new();
    let a = ReviewEntry::singleton(face("f1", "img1", E0));
    h.queue(&a).await;
    // Ledger resolved but the index never heard about it.
    h.ledger
        .mark_resolved(&a.id, Resolution::Accepted { identity_id: "alice".into() })
        .await
        .unwrap();
    // Ledger entry whose pending point was never written.
    let b = ReviewEntry::singleton(face("f2", "img2", E1));
    h.ledger.insert(&b).await.unwrap();

    let cancel = CancellationToken::new();
    let report = h.engine.reconcile(&cancel).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.flagged, 1);
    assert_eq!(report.restored, 1);
    assert_eq!(report.indexed, 1);
    assert_eq!(report.skipped, 0);

    assert!(h.pending_point(&a.id).await.unwrap().payload.resolved);
    let restored = h
        .index
        .get(&h.cfg.confirmed_collection, "f1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.payload.identity_id.as_deref(), Some("alice"));
    assert!(!h.pending_point(&b.id).await.unwrap().payload.resolved);

    let again = h.engine.reconcile(&cancel).await.unwrap();
    assert_eq!(again.scanned, 1);
    assert_eq!(again.flagged + again.restored + again.indexed, 0);
}

#[tokio::test]
async fn reconcile_flags_orphan_points() {
    let h = Harness::new();
    h.index
        .upsert(
            &h.cfg.pending_collection,
            vec![Point::new("ghost", E0.to_vec(), PointPayload::pending("ghost"))],
        )
        .await
        .unwrap();

    let report = h.engine.reconcile(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.flagged, 1);
    assert!(h.pending_point("ghost").await.unwrap().payload.resolved);
}
