//! Escalation policy implementation.

use crate::core::{ScanContext, ScanResult, ScannerKind};
use crate::policy::rules::{Condition, EscalationRule};
use crate::review::ReviewEntry;

/// Decides which normalized results need human review.
///
/// Only results from malware-class scanners (antivirus, signature matcher)
/// can escalate, and a failed run only when it still reported detections.
/// Vulnerability and SBOM findings are informational and never escalate,
/// whatever the rules say.
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    /// Rules ordered by priority, highest first.
    rules: Vec<EscalationRule>,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}

impl EscalationPolicy {
    /// Creates a policy with no rules; nothing escalates.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a rule to the policy.
    pub fn add_rule(&mut self, rule: EscalationRule) {
        self.rules.push(rule);
        // Sort by priority (highest first)
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Adds a rule and returns self for chaining.
    pub fn with_rule(mut self, rule: EscalationRule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Returns a reference to the rules.
    pub fn rules(&self) -> &[EscalationRule] {
        &self.rules
    }

    /// Returns the first rule that fires for `result`, if it may escalate at all.
    pub fn matching_rule(&self, result: &ScanResult) -> Option<&EscalationRule> {
        if !result.scanner.is_malware_class() || (!result.succeeded && !result.has_detections()) {
            return None;
        }
        self.rules.iter().find(|rule| rule.matches(result))
    }

    /// Evaluates one result, returning the review entry to enqueue.
    pub fn evaluate(&self, result: &ScanResult, context: &ScanContext) -> Option<ReviewEntry> {
        let rule = self.matching_rule(result)?;

        tracing::debug!(
            rule_id = %rule.id,
            rule_name = %rule.name,
            scan_type = %result.scan_type,
            "Escalation rule matched"
        );

        let path = context
            .artifact_name
            .clone()
            .unwrap_or_else(|| result.target.clone());
        let mut entry = ReviewEntry::new(result.scan_type.clone(), path)
            .with_target(result.target.clone())
            .with_detections(result.detections.iter().map(|d| d.name.clone()).collect())
            .with_rule_id(rule.id.clone());
        if let Some(digest) = &context.artifact_digest {
            entry = entry.with_artifact_digest(digest.clone());
        }
        Some(entry)
    }

    /// The default policy.
    ///
    /// - Escalates any structured detection
    /// - Falls back to ClamAV's `FOUND` marker in the report text
    /// - Falls back to a non-zero `Infected files:` summary
    pub fn default_policy() -> Self {
        Self::empty()
            .with_rule(
                EscalationRule::new("structured-detection")
                    .with_name("Escalate Detections")
                    .with_condition(Condition::AnyDetection)
                    .with_priority(100),
            )
            .with_rule(
                EscalationRule::new("av-found-marker")
                    .with_name("Escalate ClamAV FOUND Marker")
                    .for_scanner(ScannerKind::Av)
                    .with_condition(Condition::details_contains(" FOUND"))
                    .with_priority(50),
            )
            .with_rule(
                EscalationRule::new("av-infected-summary")
                    .with_name("Escalate ClamAV Infected Summary")
                    .for_scanner(ScannerKind::Av)
                    .with_condition(Condition::infected_count_above(0))
                    .with_priority(40),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Detection, FailureKind, Severity};

    fn hit(kind: ScannerKind, label: &str) -> ScanResult {
        ScanResult::success(kind, label, "/tmp/ws/upload.zip", "/tmp/ws/x: Eicar FOUND")
            .with_detections(vec![Detection::new("Eicar", Severity::Critical)])
            .with_severity(Severity::Critical)
    }

    #[test]
    fn test_av_detection_escalates() {
        let policy = EscalationPolicy::default_policy();
        let context = ScanContext::new()
            .with_artifact_name("upload.zip")
            .with_artifact_digest("blake3:abc");

        let entry = policy.evaluate(&hit(ScannerKind::Av, "ClamAV"), &context).unwrap();
        assert_eq!(entry.scan_type, "ClamAV");
        assert_eq!(entry.path, "upload.zip");
        assert_eq!(entry.target, "/tmp/ws/upload.zip");
        assert_eq!(entry.detections, vec!["Eicar"]);
        assert_eq!(entry.artifact_digest.as_deref(), Some("blake3:abc"));
        assert_eq!(entry.rule_id.as_deref(), Some("structured-detection"));
        assert!(entry.is_pending());
    }

    #[test]
    fn test_vuln_findings_never_escalate() {
        let policy = EscalationPolicy::default_policy().with_rule(
            EscalationRule::new("everything")
                .with_condition(Condition::severity_at_least(Severity::Info))
                .with_priority(1000),
        );
        let context = ScanContext::new();

        assert!(policy.evaluate(&hit(ScannerKind::VulnScan, "Trivy FS"), &context).is_none());
        assert!(policy.evaluate(&hit(ScannerKind::SbomScan, "Grype Image"), &context).is_none());
    }

    #[test]
    fn test_failed_scan_never_escalates() {
        let policy = EscalationPolicy::default_policy();
        let result = ScanResult::failed(
            ScannerKind::Av,
            "ClamAV",
            "/x",
            FailureKind::NonZeroExit,
            "ERROR: Can't open file x FOUND",
        );
        assert!(policy.evaluate(&result, &ScanContext::new()).is_none());
    }

    #[test]
    fn test_failed_scan_with_detections_escalates() {
        let policy = EscalationPolicy::default_policy();
        let result = ScanResult::failed(
            ScannerKind::Av,
            "ClamAV",
            "/scan",
            FailureKind::NonZeroExit,
            "/scan/locked: Permission denied. ERROR",
        )
        .with_detections(vec![Detection::new("Eicar-Test-Signature", Severity::Critical)]);

        let entry = policy.evaluate(&result, &ScanContext::new()).unwrap();
        assert_eq!(entry.detections, vec!["Eicar-Test-Signature"]);
        assert_eq!(entry.rule_id.as_deref(), Some("structured-detection"));
    }

    #[test]
    fn test_yara_rule_named_like_a_diagnostic_escalates() {
        use crate::core::RawOutput;
        use crate::normalize::normalize;

        let raw = RawOutput::completed("yara", "ErrorHandler_Stealer /scan/a.exe\n");
        let result = normalize(ScannerKind::SignatureMatch, "YARA", "/scan", &raw);

        let entry = EscalationPolicy::default_policy()
            .evaluate(&result, &ScanContext::new())
            .unwrap();
        assert_eq!(entry.detections, vec!["ErrorHandler_Stealer"]);
    }

    #[test]
    fn test_text_fallback_without_structured_detections() {
        let policy = EscalationPolicy::default_policy();

        let marker = ScanResult::success(ScannerKind::Av, "ClamAV", "/x", "weird line FOUND");
        let rule = policy.matching_rule(&marker).unwrap();
        assert_eq!(rule.id, "av-found-marker");

        let summary = ScanResult::success(ScannerKind::Av, "ClamAV", "/x", "Infected files: 3");
        assert_eq!(policy.matching_rule(&summary).unwrap().id, "av-infected-summary");

        let clean = ScanResult::success(ScannerKind::Av, "ClamAV", "/x", "/x/a: OK\nInfected files: 0");
        assert!(policy.matching_rule(&clean).is_none());
    }

    #[test]
    fn test_path_falls_back_to_target() {
        let policy = EscalationPolicy::default_policy();
        let entry = policy
            .evaluate(&hit(ScannerKind::SignatureMatch, "YARA"), &ScanContext::new())
            .unwrap();
        assert_eq!(entry.path, "/tmp/ws/upload.zip");
    }
}
