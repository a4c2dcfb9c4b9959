//! Grype SBOM-based vulnerability scanner backend.

use crate::core::process::{probe_version, run_configured};
use crate::core::{
    AdapterConfig, ArtifactKind, ArtifactRef, RawOutput, ScanError, ScannerAdapter, ScannerKind,
};

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Grype configuration.
#[derive(Debug, Clone)]
pub struct GrypeConfig {
    /// Path to the `grype` executable.
    pub program: PathBuf,

    /// Time budget for one scan.
    pub timeout: Duration,

    /// Whether to scan directories as well as images.
    pub scan_directories: bool,
}

impl Default for GrypeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("grype"),
            timeout: Duration::from_secs(600),
            scan_directories: false,
        }
    }
}

impl GrypeConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the executable path.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the scan timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables `dir:` scans of filesystem artifacts.
    pub fn with_scan_directories(mut self, enabled: bool) -> Self {
        self.scan_directories = enabled;
        self
    }
}

impl AdapterConfig for GrypeConfig {
    fn program(&self) -> &PathBuf {
        &self.program
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Grype adapter.
#[derive(Debug)]
pub struct GrypeScanner {
    config: GrypeConfig,
}

impl GrypeScanner {
    /// Creates a Grype adapter with the given configuration.
    pub fn new(config: GrypeConfig) -> Self {
        Self { config }
    }

    /// Creates a Grype adapter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(GrypeConfig::default())
    }

    fn build_args(&self, target: &ArtifactRef) -> Result<Vec<OsString>, ScanError> {
        let source: OsString = match target {
            ArtifactRef::ContainerImage(name) => name.into(),
            ArtifactRef::FilesystemPath(path) => {
                let mut source = OsString::from("dir:");
                source.push(path.as_os_str());
                source
            }
            ArtifactRef::RepositoryLocation(_) => {
                return Err(ScanError::internal("grype cannot scan remote repositories"));
            }
        };
        Ok(vec![source, "--output".into(), "json".into(), "--quiet".into()])
    }
}

#[async_trait]
impl ScannerAdapter for GrypeScanner {
    fn name(&self) -> &str {
        "grype"
    }

    fn kind(&self) -> ScannerKind {
        ScannerKind::SbomScan
    }

    fn supports(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Image => true,
            ArtifactKind::Filesystem => self.config.scan_directories,
            ArtifactKind::Repository => false,
        }
    }

    fn scan_label(&self, target: &ArtifactRef) -> String {
        match target {
            ArtifactRef::ContainerImage(_) => "Grype Image".to_string(),
            _ => "Grype Dir".to_string(),
        }
    }

    async fn invoke(&self, target: &ArtifactRef) -> Result<RawOutput, ScanError> {
        target.validate()?;
        let args = self.build_args(target)?;
        tracing::info!(engine = "grype", target = %target, "Running Grype scan");
        run_configured("grype", &self.config, &args, &[0]).await
    }

    async fn health_check(&self) -> Result<(), ScanError> {
        probe_version("grype", &self.config.program).await
    }
}
