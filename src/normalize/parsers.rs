//! Per-tool output parsers.
//!
//! Each parser turns one tool's stdout into a list of [`Detection`]s plus a
//! structured `raw` value. A parser returns `None` when the output is not in
//! the format it expects; the caller then passes the text through.

use crate::core::{Detection, Severity};

use serde::Deserialize;
use serde_json::Value;

/// Parsed tool output.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    /// Findings extracted from the output.
    pub detections: Vec<Detection>,
    /// Structured form of the output.
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyReport {
    #[serde(default)]
    results: Option<Vec<TrivyTarget>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyTarget {
    #[serde(default)]
    target: String,
    #[serde(default)]
    vulnerabilities: Option<Vec<TrivyVulnerability>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyVulnerability {
    #[serde(rename = "VulnerabilityID")]
    vulnerability_id: String,
    #[serde(default)]
    pkg_name: Option<String>,
    #[serde(default)]
    severity: Option<String>,
}

/// Parses `trivy --format json` output.
pub fn parse_trivy(stdout: &str) -> Option<Parsed> {
    let raw: Value = serde_json::from_str(stdout.trim()).ok()?;
    let report: TrivyReport = serde_json::from_value(raw.clone()).ok()?;

    let detections = report
        .results
        .unwrap_or_default()
        .into_iter()
        .flat_map(|target| {
            let location = target.target;
            target
                .vulnerabilities
                .unwrap_or_default()
                .into_iter()
                .map(move |vuln| {
                    let severity = Severity::from_vendor(vuln.severity.as_deref().unwrap_or(""));
                    let place = match vuln.pkg_name {
                        Some(pkg) if !location.is_empty() => format!("{} ({})", pkg, location),
                        Some(pkg) => pkg,
                        None => location.clone(),
                    };
                    Detection::new(vuln.vulnerability_id, severity).with_location(place)
                })
        })
        .collect();

    Some(Parsed { detections, raw })
}

#[derive(Debug, Deserialize)]
struct GrypeReport {
    #[serde(default)]
    matches: Vec<GrypeMatch>,
}

#[derive(Debug, Deserialize)]
struct GrypeMatch {
    vulnerability: GrypeVulnerability,
    #[serde(default)]
    artifact: Option<GrypeArtifact>,
}

#[derive(Debug, Deserialize)]
struct GrypeVulnerability {
    id: String,
    #[serde(default)]
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GrypeArtifact {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

/// Parses `grype --output json` output.
pub fn parse_grype(stdout: &str) -> Option<Parsed> {
    let raw: Value = serde_json::from_str(stdout.trim()).ok()?;
    let report: GrypeReport = serde_json::from_value(raw.clone()).ok()?;

    let detections = report
        .matches
        .into_iter()
        .map(|m| {
            let severity = Severity::from_vendor(m.vulnerability.severity.as_deref().unwrap_or(""));
            let detection = Detection::new(m.vulnerability.id, severity);
            match m.artifact {
                Some(GrypeArtifact { name, version: Some(v) }) => {
                    detection.with_location(format!("{}@{}", name, v))
                }
                Some(GrypeArtifact { name, version: None }) => detection.with_location(name),
                None => detection,
            }
        })
        .collect();

    Some(Parsed { detections, raw })
}

/// Parses ClamAV's `<path>: <signature> FOUND` lines.
///
/// Works for both `clamscan` and clamd replies. Clean output has no
/// `FOUND` lines and yields an empty detection list.
pub fn parse_clamav(stdout: &str) -> Option<Parsed> {
    let detections = stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let body = line.strip_suffix(" FOUND")?;
            let (path, signature) = body.rsplit_once(": ")?;
            Some(Detection::new(signature.trim(), Severity::Critical).with_location(path))
        })
        .collect();

    Some(Parsed {
        detections,
        raw: Value::String(stdout.to_string()),
    })
}

/// Parses YARA's `<rule> <path>` lines.
///
/// Lines whose first token is not a rule identifier (`warning:`, `error:`)
/// and `error scanning` lines are yara's own diagnostics and are skipped.
pub fn parse_yara(stdout: &str) -> Option<Parsed> {
    let detections = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_yara_diagnostic(line))
        .filter_map(|line| {
            let (rule, path) = line.split_once(char::is_whitespace)?;
            Some(Detection::new(rule, Severity::Error).with_location(path.trim()))
        })
        .collect();

    Some(Parsed {
        detections,
        raw: Value::String(stdout.to_string()),
    })
}

fn is_yara_diagnostic(line: &str) -> bool {
    if line.starts_with("error scanning ") {
        return true;
    }
    let rule = line.split(char::is_whitespace).next().unwrap_or_default();
    let mut chars = rule.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    !(valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_'))
}
