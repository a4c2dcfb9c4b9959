//! Result normalization.
//!
//! Maps one adapter's [`RawOutput`] into the shared [`ScanResult`] shape.
//! Parsing is format coercion only: output a parser does not understand is
//! passed through verbatim, and `succeeded` always reflects the process exit
//! alone. Hits a tool printed before failing are kept on the failed result.
//!
//! Adding a tool means adding one parser in [`parsers`] and one arm in
//! [`parser_for`].

pub mod parsers;

use crate::core::{Detection, FailureKind, RawOutput, ScanResult, ScannerKind, Severity};
use parsers::Parsed;

use serde_json::Value;

type Parser = fn(&str) -> Option<Parsed>;

/// Returns the output parser for a scanner kind.
pub fn parser_for(kind: ScannerKind) -> Parser {
    match kind {
        ScannerKind::VulnScan => parsers::parse_trivy,
        ScannerKind::SbomScan => parsers::parse_grype,
        ScannerKind::Av => parsers::parse_clamav,
        ScannerKind::SignatureMatch => parsers::parse_yara,
    }
}

/// Normalizes one adapter's raw output.
///
/// # Example
///
/// ```rust
/// use scanwarden::core::{RawOutput, ScannerKind, Severity};
/// use scanwarden::normalize::normalize;
///
/// let raw = RawOutput::completed("clamav", "/up/a.exe: Eicar-Signature FOUND\n");
/// let result = normalize(ScannerKind::Av, "ClamAV", "/up/a.exe", &raw);
///
/// assert!(result.succeeded);
/// assert_eq!(result.severity, Severity::Critical);
/// assert_eq!(result.detections[0].name, "Eicar-Signature");
/// ```
pub fn normalize(
    kind: ScannerKind,
    scan_type: impl Into<String>,
    target: impl Into<String>,
    raw: &RawOutput,
) -> ScanResult {
    if !raw.completed_normally {
        let failed = ScanResult::failed(kind, scan_type, target, FailureKind::NonZeroExit, raw.diagnostic())
            .with_raw(Value::String(raw.stderr.clone()))
            .with_duration(raw.duration);

        // A tool can report hits for some files and errors for others.
        return match parser_for(kind)(&raw.stdout) {
            Some(parsed) if !parsed.detections.is_empty() => {
                let severity = max_severity(&parsed.detections).max(Severity::Error);
                failed.with_severity(severity).with_detections(parsed.detections)
            }
            _ => failed,
        };
    }

    let result = ScanResult::success(kind, scan_type, target, raw.stdout.clone()).with_duration(raw.duration);

    match parser_for(kind)(&raw.stdout) {
        Some(parsed) => {
            let severity = max_severity(&parsed.detections);
            result
                .with_severity(severity)
                .with_raw(parsed.raw)
                .with_detections(parsed.detections)
        }
        None => {
            tracing::debug!(scanner = %kind, "Unparsable scanner output passed through");
            result.with_raw(Value::String(raw.stdout.clone()))
        }
    }
}

fn max_severity(detections: &[Detection]) -> Severity {
    detections
        .iter()
        .map(|d| d.severity)
        .max()
        .unwrap_or(Severity::Info)
}

/// A nested collection of results from a fan-out.
#[derive(Debug, Clone)]
pub enum ResultTree {
    /// One result.
    Single(ScanResult),
    /// A group of results or further groups.
    Group(Vec<ResultTree>),
}

impl From<ScanResult> for ResultTree {
    fn from(result: ScanResult) -> Self {
        Self::Single(result)
    }
}

impl From<Vec<ScanResult>> for ResultTree {
    fn from(results: Vec<ScanResult>) -> Self {
        Self::Group(results.into_iter().map(Self::Single).collect())
    }
}

/// Flattens a result tree into one sequence, preserving discovery order.
pub fn flatten(tree: ResultTree) -> Vec<ScanResult> {
    let mut out = Vec::new();
    flatten_into(tree, &mut out);
    out
}

fn flatten_into(tree: ResultTree, out: &mut Vec<ScanResult>) {
    match tree {
        ResultTree::Single(result) => out.push(result),
        ResultTree::Group(children) => {
            for child in children {
                flatten_into(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparsable_output_passes_through() {
        let raw = RawOutput::completed("trivy", "FATAL not json at all");
        let result = normalize(ScannerKind::VulnScan, "Trivy FS", "/up/a", &raw);

        assert!(result.succeeded);
        assert_eq!(result.details, "FATAL not json at all");
        assert_eq!(result.raw, Value::String("FATAL not json at all".into()));
        assert_eq!(result.severity, Severity::Info);
        assert!(result.detections.is_empty());
    }

    #[test]
    fn test_abnormal_exit_uses_diagnostic() {
        let raw = RawOutput::abnormal("yara", Some(1), "error: could not open rules file");
        let result = normalize(ScannerKind::SignatureMatch, "YARA", "/up/a", &raw);

        assert!(!result.succeeded);
        assert_eq!(result.details, "error: could not open rules file");
        assert_eq!(result.severity, Severity::Error);
        assert_eq!(result.failure, Some(FailureKind::NonZeroExit));
    }

    #[test]
    fn test_abnormal_exit_keeps_reported_hits() {
        // clamscan exits 2 when some files could not be read
        let raw = RawOutput {
            stdout: "/up/a.exe: Eicar-Signature FOUND\n".to_string(),
            ..RawOutput::abnormal("clamav", Some(2), "/up/locked: Access denied ERROR")
        };
        let result = normalize(ScannerKind::Av, "ClamAV", "/up", &raw);

        assert!(!result.succeeded);
        assert_eq!(result.details, "/up/locked: Access denied ERROR");
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.detections[0].location.as_deref(), Some("/up/a.exe"));
    }

    #[test]
    fn test_severity_is_max_of_detections() {
        let stdout = r#"{"Results": [{"Target": "x", "Vulnerabilities": [
            {"VulnerabilityID": "A", "Severity": "MEDIUM"},
            {"VulnerabilityID": "B", "Severity": "CRITICAL"}
        ]}]}"#;
        let raw = RawOutput::completed("trivy", stdout);
        let result = normalize(ScannerKind::VulnScan, "Trivy FS", "/up/a", &raw);

        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.detections.len(), 2);
        assert_eq!(result.details, stdout);
    }

    #[test]
    fn test_flatten_preserves_order() {
        let mk = |label: &str| ScanResult::success(ScannerKind::VulnScan, label, "t", "");
        let tree = ResultTree::Group(vec![
            mk("a").into(),
            ResultTree::Group(vec![mk("b").into(), ResultTree::Group(vec![mk("c").into()])]),
            vec![mk("d"), mk("e")].into(),
        ]);

        let labels: Vec<_> = flatten(tree).into_iter().map(|r| r.scan_type).collect();
        assert_eq!(labels, vec!["a", "b", "c", "d", "e"]);
    }
}
