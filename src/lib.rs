//! # Scanwarden
//!
//! Scan orchestration across external security scanners, with a durable
//! manual-review queue for malware hits.
//!
//! ## Overview
//!
//! Scanwarden takes one artifact (an uploaded file or archive, a container
//! image, or a repository), runs every applicable scanner against it
//! concurrently, and returns one normalized result per scanner:
//!
//! - Trivy and Grype for vulnerabilities
//! - ClamAV (CLI or clamd socket) and YARA for malware
//! - Archives are sniffed and unpacked into a scoped workspace first
//! - Images and repositories are exported or cloned for filesystem-only engines
//! - Antivirus and signature hits are escalated into a persistent review queue
//!
//! A failing or hanging scanner never takes its siblings down: it becomes a
//! result with `succeeded = false`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scanwarden::prelude::*;
//! use scanwarden::backends::{ClamAvScanner, TrivyScanner};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reviews = Arc::new(ReviewQueue::new(Arc::new(JsonFileStore::open("/var/lib/scans/review.json")?)));
//!
//!     let dispatcher = ScanDispatcher::builder()
//!         .add_adapter(TrivyScanner::with_defaults())
//!         .add_adapter(ClamAvScanner::with_defaults())
//!         .with_review_queue(reviews)
//!         .build()?;
//!
//!     let report = dispatcher
//!         .dispatch(&ArtifactRef::path("/srv/uploads/invoice.zip"), &ScanContext::new())
//!         .await?;
//!
//!     for result in report.all_results() {
//!         println!("{}: {} ({})", result.scan_type, result.severity, result.succeeded);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `default` - Includes `clamd`
//! - `clamd` - ClamAV daemon transport over a Unix socket
//!
//! ## Architecture
//!
//! - **Core**: Artifact references, results, errors, the adapter trait
//! - **Backends**: One adapter per external tool
//! - **Normalize**: Tool output to the shared result shape
//! - **Policy**: Rules deciding which results need a human
//! - **Review**: The persistent review queue
//! - **Workspace**: Scoped temp dirs, extraction, export, clone
//! - **Manager**: Dispatcher, session and service facade
//! - **Audit**: Structured events for scans and review transitions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod config;
pub mod core;
pub mod manager;
pub mod normalize;
pub mod policy;
pub mod review;
pub mod workspace;

// Re-export commonly used types at the crate root
pub use crate::core::{
    ArtifactKind, ArtifactRef, Detection, ReviewError, ScanContext, ScanError, ScanReport,
    ScanResult, ScannerAdapter, ScannerKind, Severity,
};

pub use crate::config::ServiceConfig;
pub use crate::manager::{ScanDispatcher, ScanService, SessionSnapshot};
pub use crate::policy::{EscalationPolicy, EscalationRule};
pub use crate::review::{ReviewEntry, ReviewQueue, ReviewRef};

/// Prelude module for convenient imports.
///
/// ```rust
/// use scanwarden::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::ServiceConfig;
    pub use crate::core::{
        ArtifactKind, ArtifactRef, Detection, ReviewError, ScanContext, ScanError, ScanReport,
        ScanResult, ScannerAdapter, ScannerKind, Severity,
    };
    pub use crate::manager::{
        ActionResponse, DispatcherConfig, ScanDispatcher, ScanRequest, ScanService,
        SessionSnapshot, UploadedFile,
    };
    pub use crate::policy::{EscalationPolicy, EscalationRule};
    pub use crate::review::{JsonFileStore, ReviewEntry, ReviewQueue, ReviewRef, ReviewStatus};
}
