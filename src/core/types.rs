//! Core types used throughout the scanwarden library.
//!
//! This module defines the scanner taxonomy, the shared severity scale,
//! detection records and the per-request scan context.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The class of external scanning capability an adapter wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerKind {
    /// Vulnerability scanner (Trivy).
    VulnScan,
    /// Antivirus engine (ClamAV).
    Av,
    /// Signature matcher (YARA).
    SignatureMatch,
    /// SBOM-based vulnerability scanner (Grype).
    SbomScan,
}

impl ScannerKind {
    /// All scanner kinds, in display order.
    pub const ALL: [ScannerKind; 4] = [
        ScannerKind::VulnScan,
        ScannerKind::Av,
        ScannerKind::SignatureMatch,
        ScannerKind::SbomScan,
    ];

    /// Returns `true` for scanners whose hits must gate human action.
    pub fn is_malware_class(&self) -> bool {
        matches!(self, Self::Av | Self::SignatureMatch)
    }

    /// Returns a stable lowercase identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VulnScan => "vuln_scan",
            Self::Av => "av",
            Self::SignatureMatch => "signature_match",
            Self::SbomScan => "sbom_scan",
        }
    }
}

impl fmt::Display for ScannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity on the shared scale every normalized result uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    #[default]
    Info,
    /// Worth a look.
    Warning,
    /// A real problem or a failed scan.
    Error,
    /// Requires immediate action.
    Critical,
}

impl Severity {
    /// Maps a tool's own severity label onto the shared scale.
    ///
    /// Trivy and Grype both use CRITICAL/HIGH/MEDIUM/LOW plus a few
    /// informational labels (NEGLIGIBLE, UNKNOWN).
    pub fn from_vendor(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Self::Critical,
            "HIGH" => Self::Error,
            "MEDIUM" | "MODERATE" => Self::Warning,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One positive finding reported by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Signature, rule or vulnerability identifier.
    pub name: String,

    /// Where it was found (file path, package), if the tool says.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Severity on the shared scale.
    pub severity: Severity,
}

impl Detection {
    /// Creates a new detection.
    pub fn new(name: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            location: None,
            severity,
        }
    }

    /// Sets the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Why an adapter invocation did not produce a normal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Input was rejected before the tool was started.
    InvalidInput,
    /// The tool did not finish in time.
    Timeout,
    /// The tool exited abnormally.
    NonZeroExit,
    /// The tool could not be started or reached.
    Unavailable,
    /// The artifact could not be unpacked.
    Extraction,
    /// Anything else.
    Internal,
}

/// Context information for a scan request.
///
/// Carries what the caller knows about the artifact beyond its location,
/// used for review entries and audit logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanContext {
    /// Request or correlation ID for tracing.
    pub request_id: Option<String>,

    /// Human-facing name of the artifact (upload filename, image, URL).
    pub artifact_name: Option<String>,

    /// BLAKE3 digest of the uploaded payload, when there was one.
    pub artifact_digest: Option<String>,

    /// Additional custom metadata as key-value pairs.
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

impl ScanContext {
    /// Creates a new empty scan context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request ID.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Sets the artifact name.
    pub fn with_artifact_name(mut self, name: impl Into<String>) -> Self {
        self.artifact_name = Some(name.into());
        self
    }

    /// Sets the artifact digest.
    pub fn with_artifact_digest(mut self, digest: impl Into<String>) -> Self {
        self.artifact_digest = Some(digest.into());
        self
    }

    /// Adds a custom metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
