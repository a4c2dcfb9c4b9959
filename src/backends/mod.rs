//! Scanner adapter implementations.
//!
//! This module contains implementations of the `ScannerAdapter` trait for
//! the external tools the dispatcher fans out to.
//!
//! ## Available Backends
//!
//! - [`trivy`] - Trivy vulnerability scanner (filesystem, image, repository)
//! - [`grype`] - Grype SBOM scanner (images, optionally directories)
//! - [`clamav`] - ClamAV via `clamscan` or the clamd socket
//! - [`yara`] - YARA rule matching
//! - [`mock`] - A mock adapter for testing
//!
//! ## Implementing a Custom Backend
//!
//! To add a new tool, implement the `ScannerAdapter` trait and run it
//! through the shared process runner:
//!
//! ```rust,ignore
//! use scanwarden::core::process::run_command;
//! use scanwarden::core::{ArtifactKind, ArtifactRef, RawOutput, ScanError, ScannerAdapter, ScannerKind};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! pub struct Semgrep;
//!
//! #[async_trait]
//! impl ScannerAdapter for Semgrep {
//!     fn name(&self) -> &str { "semgrep" }
//!     fn kind(&self) -> ScannerKind { ScannerKind::VulnScan }
//!     fn supports(&self, kind: ArtifactKind) -> bool { kind == ArtifactKind::Filesystem }
//!
//!     async fn invoke(&self, target: &ArtifactRef) -> Result<RawOutput, ScanError> {
//!         target.validate()?;
//!         // run_command("semgrep", ...).await
//!         todo!()
//!     }
//! }
//! ```

pub mod clamav;
pub mod grype;
pub mod mock;
pub mod trivy;
pub mod yara;

// Re-exports
pub use clamav::{ClamAvConfig, ClamAvScanner, ClamAvTransport};
pub use grype::{GrypeConfig, GrypeScanner};
pub use mock::{MockAdapter, MockBehavior};
pub use trivy::{TrivyConfig, TrivyScanner};
pub use yara::{YaraConfig, YaraScanner};
