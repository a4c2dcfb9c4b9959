//! Trivy vulnerability scanner backend.
//!
//! Trivy scans all three artifact kinds with one binary: `trivy fs`,
//! `trivy image` and `trivy repo`. Output is requested as JSON so the
//! normalizer can pick out individual vulnerabilities.

use crate::core::process::{probe_version, run_configured};
use crate::core::{
    AdapterConfig, ArtifactKind, ArtifactRef, RawOutput, ScanError, ScannerAdapter, ScannerKind,
};

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Trivy configuration.
#[derive(Debug, Clone)]
pub struct TrivyConfig {
    /// Path to the `trivy` executable.
    pub program: PathBuf,

    /// Time budget for one scan.
    pub timeout: Duration,

    /// Extra arguments appended before the target, e.g. `--skip-db-update`.
    pub extra_args: Vec<String>,
}

impl Default for TrivyConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("trivy"),
            timeout: Duration::from_secs(600),
            extra_args: Vec::new(),
        }
    }
}

impl TrivyConfig {
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

    /// Appends an extra argument.
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }
}

impl AdapterConfig for TrivyConfig {
    fn program(&self) -> &PathBuf {
        &self.program
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Trivy adapter.
#[derive(Debug)]
pub struct TrivyScanner {
    config: TrivyConfig,
}

impl TrivyScanner {
    /// Creates a Trivy adapter with the given configuration.
    pub fn new(config: TrivyConfig) -> Self {
        Self { config }
    }

    /// Creates a Trivy adapter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TrivyConfig::default())
    }

    fn subcommand(target: &ArtifactRef) -> &'static str {
        match target {
            ArtifactRef::FilesystemPath(_) => "fs",
            ArtifactRef::ContainerImage(_) => "image",
            ArtifactRef::RepositoryLocation(_) => "repo",
        }
    }

    /// Builds the argument list for a target.
    fn build_args(&self, target: &ArtifactRef) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            Self::subcommand(target).into(),
            "--format".into(),
            "json".into(),
            "--quiet".into(),
        ];
        args.extend(self.config.extra_args.iter().map(OsString::from));
        args.push("--".into());
        match target {
            ArtifactRef::FilesystemPath(path) => args.push(path.as_os_str().to_owned()),
            ArtifactRef::ContainerImage(name) => args.push(name.into()),
            ArtifactRef::RepositoryLocation(url) => args.push(url.into()),
        }
        args
    }
}

#[async_trait]
impl ScannerAdapter for TrivyScanner {
    fn name(&self) -> &str {
        "trivy"
    }

    fn kind(&self) -> ScannerKind {
        ScannerKind::VulnScan
    }

    fn supports(&self, _kind: ArtifactKind) -> bool {
        true
    }

    fn scan_label(&self, target: &ArtifactRef) -> String {
        match target {
            ArtifactRef::FilesystemPath(_) => "Trivy FS".to_string(),
            ArtifactRef::ContainerImage(_) => "Trivy Image".to_string(),
            ArtifactRef::RepositoryLocation(_) => "Trivy Repo".to_string(),
        }
    }

    async fn invoke(&self, target: &ArtifactRef) -> Result<RawOutput, ScanError> {
        target.validate()?;
        tracing::info!(engine = "trivy", target = %target, "Running Trivy scan");
        run_configured("trivy", &self.config, &self.build_args(target), &[0]).await
    }

    async fn health_check(&self) -> Result<(), ScanError> {
        probe_version("trivy", &self.config.program).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_per_target() {
        let scanner = TrivyScanner::new(TrivyConfig::new().with_extra_arg("--skip-db-update"));

        let args = scanner.build_args(&ArtifactRef::image("alpine:3.20"));
        assert_eq!(args[0], "image");
        assert!(args.contains(&OsString::from("--skip-db-update")));
        assert_eq!(args.last().unwrap(), "alpine:3.20");

        let args = scanner.build_args(&ArtifactRef::path("/srv/up/a"));
        assert_eq!(args[0], "fs");

        let args = scanner.build_args(&ArtifactRef::repository("https://h/r.git"));
        assert_eq!(args[0], "repo");
    }

    #[test]
    fn test_labels() {
        let scanner = TrivyScanner::with_defaults();
        assert_eq!(scanner.scan_label(&ArtifactRef::path("/x")), "Trivy FS");
        assert_eq!(scanner.scan_label(&ArtifactRef::image("x")), "Trivy Image");
        assert!(scanner.supports(ArtifactKind::Repository));
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_spawn() {
        // A missing binary would yield EngineUnavailable; InvalidInput proves
        // validation ran first.
        let scanner = TrivyScanner::new(TrivyConfig::new().with_program("/nonexistent/trivy"));
        let err = scanner.invoke(&ArtifactRef::image("../../etc")).await.unwrap_err();
        assert!(err.is_invalid_input());
    }
}
