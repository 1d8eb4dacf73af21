use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use facelink_vecstore::Gender;

/// Generates a fresh opaque id for reviews, groups and scans.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Detected faces
// ---------------------------------------------------------------------------

/// Face location inside its source image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A face produced by the external detector, with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub id: String,
    #[serde(default)]
    pub image_id: String,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
}

// ---------------------------------------------------------------------------
// Review entries
// ---------------------------------------------------------------------------

/// One face inside a review entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewMember {
    /// Face id.
    pub id: String,
    #[serde(default)]
    pub image_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl From<DetectedFace> for ReviewMember {
    fn from(face: DetectedFace) -> Self {
        Self {
            id: face.id,
            image_id: face.image_id,
            vector: Some(face.vector),
            thumbnail: face.thumbnail,
            bbox: face.bbox,
        }
    }
}

/// Resolution of a review entry. An accepted entry always names its identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    #[default]
    Unresolved,
    Accepted {
        identity_id: String,
    },
    Rejected,
}

/// A decision applied to an unresolved entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Accepted { identity_id: String },
    Rejected,
}

impl From<Resolution> for ResolutionState {
    fn from(r: Resolution) -> Self {
        match r {
            Resolution::Accepted { identity_id } => ResolutionState::Accepted { identity_id },
            Resolution::Rejected => ResolutionState::Rejected,
        }
    }
}

/// Pending (or resolved) work item: one face, or one provisional cluster of
/// faces, awaiting a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub id: String,

    /// Face embedding, or the centroid of `members` for a cluster review.
    pub vector: Vec<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_identity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_score: Option<f32>,

    /// Entries sharing a group id came from the same provisional cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    #[serde(default)]
    pub state: ResolutionState,

    /// Faces represented by this entry. A singleton review has exactly one.
    #[serde(default)]
    pub members: Vec<ReviewMember>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewEntry {
    /// A pending review for a single face, in its own group.
    pub fn singleton(face: DetectedFace) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            vector: face.vector.clone(),
            image_id: Some(face.image_id.clone()).filter(|s| !s.is_empty()),
            thumbnail: face.thumbnail.clone(),
            bbox: face.bbox,
            gender: face.gender,
            suggested_identity_id: None,
            suggested_score: None,
            group_id: Some(new_id()),
            state: ResolutionState::Unresolved,
            members: vec![face.into()],
            created_at: now,
            updated_at: now,
        }
    }

    /// A pending review for a provisional cluster. Display fields come from
    /// the first member.
    pub fn cluster(centroid: Vec<f32>, faces: Vec<DetectedFace>) -> Self {
        let now = Utc::now();
        let first = faces.first();
        Self {
            id: new_id(),
            vector: centroid,
            image_id: first.map(|f| f.image_id.clone()).filter(|s| !s.is_empty()),
            thumbnail: first.and_then(|f| f.thumbnail.clone()),
            bbox: first.and_then(|f| f.bbox),
            gender: faces.iter().find_map(|f| f.gender),
            suggested_identity_id: None,
            suggested_score: None,
            group_id: Some(new_id()),
            state: ResolutionState::Unresolved,
            members: faces.into_iter().map(ReviewMember::from).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_suggestion(mut self, suggestion: Option<&IdentityMatch>) -> Self {
        self.suggested_identity_id = suggestion.map(|m| m.identity_id.clone());
        self.suggested_score = suggestion.map(|m| m.score);
        self
    }

    pub fn accepted(&self) -> bool {
        matches!(self.state, ResolutionState::Accepted { .. })
    }

    pub fn rejected(&self) -> bool {
        matches!(self.state, ResolutionState::Rejected)
    }

    /// Resolved entries are excluded from sweeps and propagation.
    pub fn resolved(&self) -> bool {
        !matches!(self.state, ResolutionState::Unresolved)
    }

    /// Confirmed identity, set only when accepted.
    pub fn identity_id(&self) -> Option<&str> {
        match &self.state {
            ResolutionState::Accepted { identity_id } => Some(identity_id),
            _ => None,
        }
    }

    pub fn face_count(&self) -> usize {
        self.members.len()
    }

    /// Every face in the entry as `(face id, image id, vector)`. Members
    /// without a vector fall back to the entry vector; an entry without
    /// members stands for itself.
    pub fn faces(&self) -> Vec<(String, String, Vec<f32>)> {
        if self.members.is_empty() {
            return vec![(
                self.id.clone(),
                self.image_id.clone().unwrap_or_default(),
                self.vector.clone(),
            )];
        }
        self.members
            .iter()
            .map(|m| {
                let vector = m
                    .vector
                    .clone()
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| self.vector.clone());
                (m.id.clone(), m.image_id.clone(), vector)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// A confirmed, named identity ("album").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default)]
    pub face_count: usize,
    #[serde(default)]
    pub image_count: usize,
    /// Confirmed cluster most representative of this identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_cluster: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            display_name: display_name.into(),
            handle: None,
            face_count: 0,
            image_count: 0,
            dominant_cluster: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A face that belongs to a confirmed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterFace {
    pub image_id: String,
    pub face_id: String,
}

/// Accumulated confirmed faces of one identity. Membership only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityCluster {
    pub id: String,
    pub identity_id: String,
    #[serde(default)]
    pub members: Vec<ClusterFace>,
    #[serde(default)]
    pub sample_face_ids: Vec<String>,
    #[serde(default)]
    pub image_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl IdentityCluster {
    pub fn new(identity_id: impl Into<String>) -> Self {
        let identity_id = identity_id.into();
        Self {
            id: identity_id.clone(),
            identity_id,
            members: Vec::new(),
            sample_face_ids: Vec::new(),
            image_count: 0,
            updated_at: Utc::now(),
        }
    }

    /// Appends faces not already present and recomputes `image_count`.
    /// Returns the number of faces added.
    pub fn append(&mut self, faces: impl IntoIterator<Item = ClusterFace>, sample_cap: usize) -> usize {
        let mut added = 0;
        for face in faces {
            if self.members.iter().any(|m| m.face_id == face.face_id) {
                continue;
            }
            if self.sample_face_ids.len() < sample_cap {
                self.sample_face_ids.push(face.face_id.clone());
            }
            self.members.push(face);
            added += 1;
        }
        let mut images: Vec<&str> = self
            .members
            .iter()
            .map(|m| m.image_id.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        images.sort_unstable();
        images.dedup();
        self.image_count = images.len();
        if added > 0 {
            self.updated_at = Utc::now();
        }
        added
    }
}

/// Best identity found for a vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityMatch {
    pub identity_id: String,
    pub score: f32,
    /// Confirmed point that produced the match.
    pub point_id: String,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of accepting an identity for a review entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceptOutcome {
    pub review_id: String,
    pub identity_id: String,
    /// Pending entries resolved because they were near-duplicates.
    pub duplicates: Vec<String>,
    /// Pending entries resolved because they shared the group id.
    pub group_mates: Vec<String>,
    pub sweep: SweepReport,
}

/// Counters from one pending sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub resolved: usize,
    pub suggested: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Result of removing a face from a cluster review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemoveOutcome {
    /// The face now lives in its own pending review.
    Moved {
        new_review_id: String,
        /// True when the original review lost its last face and was rejected.
        original_rejected: bool,
    },
    MemberNotFound,
}

/// Result of submitting a single face outside a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Matched {
        found: IdentityMatch,
        duplicates: Vec<String>,
    },
    Pending {
        review_id: String,
        suggestion: Option<IdentityMatch>,
    },
}

/// Counters from one index/ledger reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    /// Pending points flagged resolved because their entry was resolved.
    pub flagged: usize,
    /// Confirmed points restored for accepted entries.
    pub restored: usize,
    /// Pending points written for ledger entries that had none.
    pub indexed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// Scans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    Running,
    Completed,
    Cancelled,
    /// The whole scan aborted; per-image failures never cause this.
    Error,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanState::Running)
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanState::Running => f.write_str("running"),
            ScanState::Completed => f.write_str("completed"),
            ScanState::Cancelled => f.write_str("cancelled"),
            ScanState::Error => f.write_str("error"),
        }
    }
}

/// Progress of one bulk scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub scan_id: String,
    pub state: ScanState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub files: usize,
    #[serde(default)]
    pub faces: usize,
    #[serde(default)]
    pub matches: usize,
    #[serde(default)]
    pub reviews: usize,
    #[serde(default)]
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScanStatus {
    pub fn started(scan_id: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            state: ScanState::Running,
            error: None,
            files: 0,
            faces: 0,
            matches: 0,
            reviews: 0,
            skipped: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}
