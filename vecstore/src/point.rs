use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Perceived gender attached to a detected face by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Female => f.write_str("female"),
            Gender::Male => f.write_str("male"),
        }
    }
}

/// Attributes stored alongside a point.
///
/// Known fields are typed; `extra` only carries fields this crate does not
/// know about (written by other producers of the same collection).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    /// Confirmed identity this face belongs to (confirmed collection only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,

    /// Review entry the point mirrors (pending collection only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    #[serde(default)]
    pub resolved: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_identity_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_score: Option<f32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PointPayload {
    /// Payload for a face confirmed as `identity_id`.
    pub fn confirmed(identity_id: impl Into<String>) -> Self {
        Self {
            identity_id: Some(identity_id.into()),
            resolved: true,
            ..Default::default()
        }
    }

    /// Payload mirroring a pending review entry.
    pub fn pending(review_id: impl Into<String>) -> Self {
        Self {
            review_id: Some(review_id.into()),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image_id: Option<String>) -> Self {
        self.image_id = image_id;
        self
    }

    pub fn with_gender(mut self, gender: Option<Gender>) -> Self {
        self.gender = gender;
        self
    }

    pub fn with_group(mut self, group_id: Option<String>) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn with_suggestion(mut self, identity_id: Option<String>, score: Option<f32>) -> Self {
        self.suggested_identity_id = identity_id;
        self.suggested_score = score;
        self
    }

    pub fn with_resolved(mut self, resolved: bool) -> Self {
        self.resolved = resolved;
        self
    }
}

/// A vector with its id and attributes, as written by `upsert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: PointPayload,
}

impl Point {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, payload: PointPayload) -> Self {
        Self {
            id: id.into(),
            vector,
            payload,
        }
    }
}

/// A search hit. Higher scores mean more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}

/// Attribute filter applied to search and scroll. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub resolved: Option<bool>,
    pub gender: Option<Gender>,
    /// When true, only points carrying an identity id match.
    pub has_identity: bool,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unresolved() -> Self {
        Self {
            resolved: Some(false),
            ..Default::default()
        }
    }

    pub fn with_gender(mut self, gender: Option<Gender>) -> Self {
        self.gender = gender;
        self
    }

    pub fn require_identity(mut self) -> Self {
        self.has_identity = true;
        self
    }

    pub fn matches(&self, payload: &PointPayload) -> bool {
        if let Some(resolved) = self.resolved {
            if payload.resolved != resolved {
                return false;
            }
        }
        if let Some(gender) = self.gender {
            // Faces without a detected gender are not excluded.
            if payload.gender.is_some_and(|g| g != gender) {
                return false;
            }
        }
        if self.has_identity && payload.identity_id.is_none() {
            return false;
        }
        true
    }
}

/// One page of a scroll. `next_offset` is None once the collection is
/// exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<Point>,
    pub next_offset: Option<String>,
}
