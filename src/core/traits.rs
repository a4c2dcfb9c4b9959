//! Core traits for the scanwarden library.
//!
//! This module defines the `ScannerAdapter` trait that every external tool
//! wrapper implements, and the `AdapterConfig` trait for their settings.

use crate::core::artifact::{ArtifactKind, ArtifactRef};
use crate::core::error::ScanError;
use crate::core::process::RawOutput;
use crate::core::types::ScannerKind;

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

/// A wrapper around exactly one external scanning capability.
///
/// # Implementation Notes
///
/// - `invoke` must call [`ArtifactRef::validate`] before starting anything.
/// - Abnormal tool exits are reported in the returned [`RawOutput`], not as
///   errors; `Err` is reserved for failures to run the tool at all.
/// - Severity interpretation belongs to the normalizer, not the adapter.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scanwarden::core::{ArtifactKind, ArtifactRef, RawOutput, ScanError, ScannerAdapter, ScannerKind};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct Bandit;
///
/// #[async_trait]
/// impl ScannerAdapter for Bandit {
///     fn name(&self) -> &str { "bandit" }
///     fn kind(&self) -> ScannerKind { ScannerKind::VulnScan }
///     fn supports(&self, kind: ArtifactKind) -> bool { kind == ArtifactKind::Filesystem }
///
///     async fn invoke(&self, target: &ArtifactRef) -> Result<RawOutput, ScanError> {
///         target.validate()?;
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait ScannerAdapter: Send + Sync + Debug {
    /// Returns a stable engine identifier like `"trivy"` or `"clamav"`.
    fn name(&self) -> &str;

    /// Returns the class of scanner this adapter wraps.
    fn kind(&self) -> ScannerKind;

    /// Returns whether this adapter can scan the given kind of artifact.
    fn supports(&self, kind: ArtifactKind) -> bool;

    /// Returns the label used as `scan_type` for results on this target.
    fn scan_label(&self, _target: &ArtifactRef) -> String {
        self.name().to_string()
    }

    /// Runs the tool against one target.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` - the target failed validation; nothing was started.
    /// - `Timeout` - the tool exceeded its time budget and was killed.
    /// - `EngineUnavailable` - the tool could not be started or reached.
    async fn invoke(&self, target: &ArtifactRef) -> Result<RawOutput, ScanError>;

    /// Checks that the tool is installed and responding.
    async fn health_check(&self) -> Result<(), ScanError> {
        Ok(())
    }
}

/// Settings shared by adapters that run a local executable.
pub trait AdapterConfig: Debug + Clone + Send + Sync {
    /// Returns the executable to run.
    fn program(&self) -> &PathBuf;

    /// Returns the time budget for one invocation.
    fn timeout(&self) -> Duration;
}

/// An arc-wrapped adapter for shared ownership across tasks.
pub type ArcAdapter = std::sync::Arc<dyn ScannerAdapter>;
