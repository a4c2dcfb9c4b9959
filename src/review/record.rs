//! Review entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier for a review entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewId(pub String);

impl ReviewId {
    /// Creates a new random review ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ReviewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReviewId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReviewId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a caller points at a review entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewRef {
    /// Zero-based position in the current collection.
    Position(usize),
    /// Stable identifier.
    Id(ReviewId),
}

impl From<usize> for ReviewRef {
    fn from(index: usize) -> Self {
        Self::Position(index)
    }
}

impl From<ReviewId> for ReviewRef {
    fn from(id: ReviewId) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for ReviewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(index) => write!(f, "#{}", index),
            Self::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Lifecycle state of a review entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    /// Awaiting a human decision.
    #[default]
    #[serde(rename = "Pending Review")]
    PendingReview,
    /// A human has looked at it.
    #[serde(rename = "Reviewed")]
    Reviewed,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingReview => write!(f, "Pending Review"),
            Self::Reviewed => write!(f, "Reviewed"),
        }
    }
}

/// A persisted request for human review of a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    /// Unique identifier, assigned at creation.
    #[serde(default)]
    pub id: ReviewId,

    /// Label of the scan that produced the detection, e.g. `"ClamAV"`.
    pub scan_type: String,

    /// Artifact the detection was found in, as the user knows it.
    pub path: String,

    /// The concrete location that was scanned.
    #[serde(default)]
    pub target: String,

    /// Lifecycle state.
    #[serde(default)]
    pub status: ReviewStatus,

    /// Names of the matched signatures or rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detections: Vec<String>,

    /// BLAKE3 digest of the uploaded payload, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_digest: Option<String>,

    /// Rule that caused the escalation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    /// When the entry was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// When the entry was marked reviewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ReviewEntry {
    /// Creates a pending entry.
    pub fn new(scan_type: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: ReviewId::new(),
            scan_type: scan_type.into(),
            target: path.clone(),
            path,
            status: ReviewStatus::PendingReview,
            detections: Vec::new(),
            artifact_digest: None,
            rule_id: None,
            created_at: Utc::now(),
            reviewed_at: None,
        }
    }

    /// Sets the scanned location.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Sets the matched signature names.
    pub fn with_detections(mut self, detections: Vec<String>) -> Self {
        self.detections = detections;
        self
    }

    /// Sets the payload digest.
    pub fn with_artifact_digest(mut self, digest: impl Into<String>) -> Self {
        self.artifact_digest = Some(digest.into());
        self
    }

    /// Sets the triggering rule.
    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    /// Returns `true` if the entry still awaits review.
    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::PendingReview
    }

    /// Marks the entry reviewed. Returns `false` if it already was.
    pub fn mark_reviewed(&mut self) -> bool {
        if self.status == ReviewStatus::Reviewed {
            return false;
        }
        self.status = ReviewStatus::Reviewed;
        self.reviewed_at = Some(Utc::now());
        true
    }
}
