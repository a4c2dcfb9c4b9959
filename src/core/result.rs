//! Scan result structures.
//!
//! `ScanResult` is the one shape every adapter's output is normalized into;
//! `ScanReport` groups results by artifact kind for the scan response.

use crate::core::artifact::ArtifactKind;
use crate::core::error::ScanError;
use crate::core::types::{Detection, FailureKind, ScannerKind, Severity};
use crate::review::ReviewEntry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The normalized outcome of one adapter invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Unique identifier for this scan result.
    pub id: String,

    /// The concrete thing that was scanned (path, image, URL).
    pub target: String,

    /// The class of scanner that produced this result.
    pub scanner: ScannerKind,

    /// Adapter label, e.g. `"Trivy FS"` or `"ClamAV"`.
    pub scan_type: String,

    /// Severity on the shared scale.
    pub severity: Severity,

    /// Human-readable report or diagnostic.
    pub details: String,

    /// The tool's output, parsed when it was structured.
    #[serde(default)]
    pub raw: serde_json::Value,

    /// Whether the tool completed normally.
    pub succeeded: bool,

    /// Individual findings, when the output could be parsed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detections: Vec<Detection>,

    /// Why the invocation failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    /// How long the invocation took.
    #[serde(with = "duration_serde")]
    pub duration: Duration,

    /// When the result was produced.
    pub completed_at: DateTime<Utc>,
}

impl ScanResult {
    fn base(
        scanner: ScannerKind,
        scan_type: impl Into<String>,
        target: impl Into<String>,
        details: impl Into<String>,
        succeeded: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            scanner,
            scan_type: scan_type.into(),
            severity: if succeeded { Severity::Info } else { Severity::Error },
            details: details.into(),
            raw: serde_json::Value::Null,
            succeeded,
            detections: Vec::new(),
            failure: None,
            duration: Duration::ZERO,
            completed_at: Utc::now(),
        }
    }

    /// Creates a successful result with the coarse `info` severity.
    pub fn success(
        scanner: ScannerKind,
        scan_type: impl Into<String>,
        target: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::base(scanner, scan_type, target, details, true)
    }

    /// Creates a failed result with the coarse `error` severity.
    pub fn failed(
        scanner: ScannerKind,
        scan_type: impl Into<String>,
        target: impl Into<String>,
        failure: FailureKind,
        details: impl Into<String>,
    ) -> Self {
        let mut result = Self::base(scanner, scan_type, target, details, false);
        result.failure = Some(failure);
        result
    }

    /// Folds an adapter or extraction error into a failed result.
    ///
    /// Timeouts always carry the details `"timed out"`.
    pub fn from_error(
        scanner: ScannerKind,
        scan_type: impl Into<String>,
        target: impl Into<String>,
        error: &ScanError,
    ) -> Self {
        let (failure, details) = match error {
            ScanError::InvalidInput { .. } => (FailureKind::InvalidInput, error.to_string()),
            ScanError::Timeout { .. } => (FailureKind::Timeout, "timed out".to_string()),
            ScanError::EngineUnavailable { .. } => (FailureKind::Unavailable, error.to_string()),
            ScanError::Extraction(_) => (FailureKind::Extraction, error.to_string()),
            _ => (FailureKind::Internal, error.to_string()),
        };
        Self::failed(scanner, scan_type, target, failure, details)
    }

    /// Returns `true` if the tool reported at least one finding.
    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty()
    }

    /// Sets the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the parsed output.
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    /// Sets the findings.
    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = detections;
        self
    }

    /// Sets the failure kind.
    pub fn with_failure(mut self, failure: FailureKind) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// The response to a scan request, one result group per artifact kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Results for uploaded files and archives.
    #[serde(default)]
    pub file_scan_results: Vec<ScanResult>,

    /// Results for container images.
    #[serde(default)]
    pub image_scan_results: Vec<ScanResult>,

    /// Results for repositories.
    #[serde(default)]
    pub git_scan_results: Vec<ScanResult>,

    /// Review entries created while handling this request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalated: Vec<ReviewEntry>,

    /// Review store faults met while escalating.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalation_errors: Vec<String>,
}

impl ScanReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends results to the group for the given artifact kind.
    pub fn extend(&mut self, kind: ArtifactKind, results: impl IntoIterator<Item = ScanResult>) {
        self.group_mut(kind).extend(results);
    }

    /// Moves every result and escalation of `other` into this report.
    pub fn merge(&mut self, other: ScanReport) {
        self.file_scan_results.extend(other.file_scan_results);
        self.image_scan_results.extend(other.image_scan_results);
        self.git_scan_results.extend(other.git_scan_results);
        self.escalated.extend(other.escalated);
        self.escalation_errors.extend(other.escalation_errors);
    }

    /// Returns the result group for the given artifact kind.
    pub fn group(&self, kind: ArtifactKind) -> &[ScanResult] {
        match kind {
            ArtifactKind::Filesystem => &self.file_scan_results,
            ArtifactKind::Image => &self.image_scan_results,
            ArtifactKind::Repository => &self.git_scan_results,
        }
    }

    fn group_mut(&mut self, kind: ArtifactKind) -> &mut Vec<ScanResult> {
        match kind {
            ArtifactKind::Filesystem => &mut self.file_scan_results,
            ArtifactKind::Image => &mut self.image_scan_results,
            ArtifactKind::Repository => &mut self.git_scan_results,
        }
    }

    /// Iterates over every result in the report.
    pub fn all_results(&self) -> impl Iterator<Item = &ScanResult> {
        self.file_scan_results
            .iter()
            .chain(&self.image_scan_results)
            .chain(&self.git_scan_results)
    }

    /// Returns the number of results in the report.
    pub fn result_count(&self) -> usize {
        self.all_results().count()
    }

    /// Returns `true` if some but not all adapters failed.
    pub fn is_partial_failure(&self) -> bool {
        let failed = self.all_results().filter(|r| !r.succeeded).count();
        failed > 0 && failed < self.result_count()
    }

    /// Returns `true` if every adapter failed (or none ran).
    pub fn is_total_failure(&self) -> bool {
        self.all_results().all(|r| !r.succeeded)
    }

    /// Returns `true` if any adapter reported a finding.
    pub fn findings_exist(&self) -> bool {
        self.all_results().any(ScanResult::has_detections) || !self.escalated.is_empty()
    }

    /// Returns the highest severity in the report.
    pub fn max_severity(&self) -> Severity {
        self.all_results()
            .map(|r| r.severity)
            .max()
            .unwrap_or_default()
    }
}

/// Serde helper for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
