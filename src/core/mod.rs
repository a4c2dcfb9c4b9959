//! Core types and traits for the scanwarden library.
//!
//! - [`types`] - Scanner taxonomy, severity scale, detections, scan context
//! - [`artifact`] - Artifact references and input validation
//! - [`traits`] - The `ScannerAdapter` trait
//! - [`process`] - Timeout-bound external process execution
//! - [`error`] - Structured error types
//! - [`hasher`] - BLAKE3 fingerprints for uploads
//! - [`result`] - Normalized results and the scan report

pub mod artifact;
pub mod error;
pub mod hasher;
pub mod process;
pub mod result;
pub mod traits;
pub mod types;

pub use artifact::{ArtifactKind, ArtifactRef};
pub use error::{ExtractionError, ReviewError, ReviewResult, ScanError};
pub use hasher::FileHasher;
pub use process::RawOutput;
pub use result::{ScanReport, ScanResult};
pub use traits::{AdapterConfig, ArcAdapter, ScannerAdapter};
pub use types::{Detection, FailureKind, ScanContext, ScannerKind, Severity};
