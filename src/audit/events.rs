//! Audit event emission functions.

use crate::core::{ArtifactRef, Detection, ScanContext, ScanReport, ScanResult};
use crate::review::ReviewEntry;

use serde::{Deserialize, Serialize};

/// Summary of a detection for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Signature, rule or vulnerability identifier.
    pub name: String,
    /// Severity level.
    pub severity: String,
}

impl From<&Detection> for DetectionSummary {
    fn from(d: &Detection) -> Self {
        Self {
            name: d.name.clone(),
            severity: d.severity.to_string(),
        }
    }
}

/// Emits an audit event for a dispatch starting.
pub fn emit_scan_started(artifact: &ArtifactRef, context: &ScanContext, adapter_count: usize) {
    tracing::info!(
        target: "scanwarden::audit",
        event_type = "scan_started",
        artifact_kind = %artifact.kind(),
        artifact = %artifact.display_value(),
        artifact_name = ?context.artifact_name,
        artifact_digest = ?context.artifact_digest,
        request_id = ?context.request_id,
        adapter_count,
        "Scan started"
    );
}

/// Emits an audit event for one adapter's normalized result.
pub fn emit_scan_result(result: &ScanResult, context: &ScanContext) {
    // At most 20 detections per event.
    let detections: Vec<DetectionSummary> = result
        .detections
        .iter()
        .take(20)
        .map(DetectionSummary::from)
        .collect();

    tracing::info!(
        target: "scanwarden::audit",
        event_type = "scan_result",
        scan_id = %result.id,
        scanner = %result.scanner,
        scan_type = %result.scan_type,
        target_path = %result.target,
        succeeded = result.succeeded,
        failure = ?result.failure,
        severity = %result.severity,
        duration_ms = result.duration.as_millis() as u64,
        detection_count = result.detections.len(),
        detections = ?detections,
        request_id = ?context.request_id,
        "Scan result recorded"
    );
}

/// Emits an audit event for a full scan report.
pub fn emit_scan_report(report: &ScanReport, context: &ScanContext) {
    let scan_types: Vec<&str> = report.all_results().map(|r| r.scan_type.as_str()).collect();
    let failed = report.all_results().filter(|r| !r.succeeded).count();

    tracing::info!(
        target: "scanwarden::audit",
        event_type = "scan_report",
        scan_types = ?scan_types,
        result_count = report.result_count(),
        failed_count = failed,
        max_severity = %report.max_severity(),
        findings_exist = report.findings_exist(),
        escalated_count = report.escalated.len(),
        escalation_errors = report.escalation_errors.len(),
        request_id = ?context.request_id,
        "Scan report generated"
    );
}

/// Emits an audit event when a result is escalated to review.
pub fn emit_escalation(entry: &ReviewEntry, result: &ScanResult) {
    tracing::warn!(
        target: "scanwarden::audit",
        event_type = "escalation",
        review_id = %entry.id,
        scan_id = %result.id,
        scan_type = %entry.scan_type,
        path = %entry.path,
        rule_id = ?entry.rule_id,
        detections = ?entry.detections,
        artifact_digest = ?entry.artifact_digest,
        "Detection escalated for manual review"
    );
}

/// Emits an audit event for a review entry transition.
pub fn emit_review_change(operation: &str, entry: &ReviewEntry) {
    tracing::info!(
        target: "scanwarden::audit",
        event_type = "review_operation",
        operation = %operation,
        review_id = %entry.id,
        scan_type = %entry.scan_type,
        path = %entry.path,
        status = %entry.status,
        "Review entry updated"
    );
}
