//! Mock adapter for testing.
//!
//! This module provides a configurable adapter that stands in for an
//! external tool, so dispatch, normalization and escalation can be tested
//! without Trivy, ClamAV or YARA installed.

use crate::core::{ArtifactKind, ArtifactRef, RawOutput, ScanError, ScannerAdapter, ScannerKind};

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// What the mock does when invoked.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Completes normally with the given stdout.
    Output(String),
    /// Exits abnormally with the given code and stderr.
    AbnormalExit {
        /// Exit code to report.
        exit_code: i32,
        /// Diagnostic text.
        stderr: String,
    },
    /// Fails to start, as if the binary were missing.
    Unavailable(String),
    /// Never finishes; relies on the caller's timeout.
    Hang,
}

/// A mock adapter for testing purposes.
///
/// # Examples
///
/// ```rust
/// use scanwarden::backends::MockAdapter;
/// use scanwarden::core::{ArtifactKind, ScannerKind};
///
/// // An antivirus engine that flags everything it sees
/// let av = MockAdapter::new("clamav", ScannerKind::Av)
///     .with_label("ClamAV")
///     .with_stdout("/scan/a.exe: Win.Test.EICAR_HDB-1 FOUND\n");
///
/// // A vulnerability scanner that also handles images
/// let vuln = MockAdapter::new("trivy", ScannerKind::VulnScan)
///     .with_supported(&[ArtifactKind::Filesystem, ArtifactKind::Image]);
/// ```
#[derive(Debug)]
pub struct MockAdapter {
    name: String,
    label: Option<String>,
    kind: ScannerKind,
    supported: HashSet<ArtifactKind>,
    behavior: MockBehavior,
    latency: Option<Duration>,
    invocations: AtomicU64,
    targets: RwLock<Vec<ArtifactRef>>,
    observed_files: RwLock<Vec<PathBuf>>,
    unhealthy: AtomicBool,
}

impl MockAdapter {
    /// Creates a mock that scans filesystem paths and reports nothing.
    pub fn new(name: impl Into<String>, kind: ScannerKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            kind,
            supported: HashSet::from([ArtifactKind::Filesystem]),
            behavior: MockBehavior::Output(String::new()),
            latency: None,
            invocations: AtomicU64::new(0),
            targets: RwLock::new(Vec::new()),
            observed_files: RwLock::new(Vec::new()),
            unhealthy: AtomicBool::new(false),
        }
    }

    /// Sets the `scan_type` label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the artifact kinds this mock accepts.
    pub fn with_supported(mut self, kinds: &[ArtifactKind]) -> Self {
        self.supported = kinds.iter().copied().collect();
        self
    }

    /// Sets the behavior on invocation.
    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Completes normally with `stdout`.
    pub fn with_stdout(self, stdout: impl Into<String>) -> Self {
        self.with_behavior(MockBehavior::Output(stdout.into()))
    }

    /// Sets the simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the number of invocations that passed validation.
    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Returns every target this mock was invoked with.
    pub fn targets(&self) -> Vec<ArtifactRef> {
        self.targets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the files that existed under filesystem targets at invocation time.
    pub fn observed_files(&self) -> Vec<PathBuf> {
        self.observed_files
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Sets the health status.
    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    fn record(&self, target: &ArtifactRef) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.targets
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(target.clone());

        if let Some(path) = target.as_path() {
            let mut files = Vec::new();
            collect_files(path, &mut files);
            self.observed_files
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .extend(files);
        }
    }
}

fn collect_files(path: &Path, out: &mut Vec<PathBuf>) {
    if path.is_file() {
        out.push(path.to_path_buf());
        return;
    }
    let Ok(entries) = std::fs::read_dir(path) else {
        return;
    };
    for entry in entries.flatten() {
        collect_files(&entry.path(), out);
    }
}

#[async_trait]
impl ScannerAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScannerKind {
        self.kind
    }

    fn supports(&self, kind: ArtifactKind) -> bool {
        self.supported.contains(&kind)
    }

    fn scan_label(&self, _target: &ArtifactRef) -> String {
        self.label.clone().unwrap_or_else(|| self.name.clone())
    }

    async fn invoke(&self, target: &ArtifactRef) -> Result<RawOutput, ScanError> {
        target.validate()?;
        self.record(target);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match &self.behavior {
            MockBehavior::Output(stdout) => Ok(RawOutput::completed(&self.name, stdout.clone())
                .with_duration(self.latency.unwrap_or(Duration::from_millis(1)))),
            MockBehavior::AbnormalExit { exit_code, stderr } => {
                Ok(RawOutput::abnormal(&self.name, Some(*exit_code), stderr.clone()))
            }
            MockBehavior::Unavailable(reason) => {
                Err(ScanError::engine_unavailable(&self.name, reason.clone()))
            }
            MockBehavior::Hang => std::future::pending().await,
        }
    }

    async fn health_check(&self) -> Result<(), ScanError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(ScanError::engine_unavailable(&self.name, "mock adapter is unhealthy"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_output() {
        let adapter = MockAdapter::new("clamav", ScannerKind::Av).with_stdout("x: Sig FOUND");
        let output = adapter.invoke(&ArtifactRef::path("/srv/a")).await.unwrap();
        assert!(output.completed_normally);
        assert_eq!(output.stdout, "x: Sig FOUND");
        assert_eq!(adapter.invocation_count(), 1);
        assert_eq!(adapter.targets(), vec![ArtifactRef::path("/srv/a")]);
    }

    #[tokio::test]
    async fn test_mock_validates_before_recording() {
        let adapter = MockAdapter::new("yara", ScannerKind::SignatureMatch);
        let err = adapter.invoke(&ArtifactRef::path("/srv/../etc")).await.unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(adapter.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let adapter = MockAdapter::new("trivy", ScannerKind::VulnScan);
        assert!(adapter.health_check().await.is_ok());

        adapter.set_healthy(false);
        assert!(adapter.health_check().await.is_err());

        adapter.set_healthy(true);
        assert!(adapter.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_observes_directory_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/inner.txt"), b"x").unwrap();

        let adapter = MockAdapter::new("clamav", ScannerKind::Av);
        adapter.invoke(&ArtifactRef::path(dir.path())).await.unwrap();

        let files = adapter.observed_files();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("nested/inner.txt"));
    }
}
