//! YARA signature matching backend.

use crate::core::process::{probe_version, run_configured};
use crate::core::{
    AdapterConfig, ArtifactKind, ArtifactRef, RawOutput, ScanError, ScannerAdapter, ScannerKind,
};

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the compiled rule index.
pub const DEFAULT_RULES_PATH: &str = "/opt/yara/malware_index.yar";

/// YARA configuration.
#[derive(Debug, Clone)]
pub struct YaraConfig {
    /// Path to the `yara` executable.
    pub program: PathBuf,

    /// Rule file passed to every scan.
    pub rules_path: PathBuf,

    /// Time budget for one scan.
    pub timeout: Duration,
}

impl Default for YaraConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yara"),
            rules_path: PathBuf::from(DEFAULT_RULES_PATH),
            timeout: Duration::from_secs(600),
        }
    }
}

impl YaraConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the executable path.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the rule file.
    pub fn with_rules_path(mut self, rules_path: impl Into<PathBuf>) -> Self {
        self.rules_path = rules_path.into();
        self
    }

    /// Sets the scan timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl AdapterConfig for YaraConfig {
    fn program(&self) -> &PathBuf {
        &self.program
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// YARA adapter. Prints one `<rule> <path>` line per match.
#[derive(Debug)]
pub struct YaraScanner {
    config: YaraConfig,
}

impl YaraScanner {
    /// Creates a YARA adapter with the given configuration.
    pub fn new(config: YaraConfig) -> Self {
        Self { config }
    }

    /// Creates a YARA adapter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(YaraConfig::default())
    }

    fn build_args(&self, path: &std::path::Path) -> Vec<OsString> {
        vec![
            "--recursive".into(),
            self.config.rules_path.as_os_str().to_owned(),
            path.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl ScannerAdapter for YaraScanner {
    fn name(&self) -> &str {
        "yara"
    }

    fn kind(&self) -> ScannerKind {
        ScannerKind::SignatureMatch
    }

    fn supports(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Filesystem
    }

    fn scan_label(&self, _target: &ArtifactRef) -> String {
        "YARA".to_string()
    }

    async fn invoke(&self, target: &ArtifactRef) -> Result<RawOutput, ScanError> {
        target.validate()?;
        let path = target
            .as_path()
            .ok_or_else(|| ScanError::internal("yara only scans filesystem paths"))?;

        tracing::info!(engine = "yara", path = %path.display(), rules = %self.config.rules_path.display(), "Running YARA scan");
        run_configured("yara", &self.config, &self.build_args(path), &[0]).await
    }

    async fn health_check(&self) -> Result<(), ScanError> {
        if !self.config.rules_path.exists() {
            return Err(ScanError::engine_unavailable(
                "yara",
                format!("rules file {} not found", self.config.rules_path.display()),
            ));
        }
        probe_version("yara", &self.config.program).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_order() {
        let scanner = YaraScanner::new(YaraConfig::new().with_rules_path("/rules/index.yar"));
        let args = scanner.build_args(std::path::Path::new("/srv/x"));
        assert_eq!(args, vec![
            OsString::from("--recursive"),
            OsString::from("/rules/index.yar"),
            OsString::from("/srv/x"),
        ]);
    }

    #[tokio::test]
    async fn test_health_check_missing_rules() {
        let scanner = YaraScanner::new(YaraConfig::new().with_rules_path("/nonexistent/rules.yar"));
        let err = scanner.health_check().await.unwrap_err();
        assert!(matches!(err, ScanError::EngineUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_rejects_non_path_targets() {
        let scanner = YaraScanner::with_defaults();
        assert!(!scanner.supports(ArtifactKind::Image));
        let err = scanner.invoke(&ArtifactRef::image("alpine")).await.unwrap_err();
        assert!(matches!(err, ScanError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_spawn() {
        let scanner = YaraScanner::new(YaraConfig::new().with_program("/nonexistent/yara"));
        let err = scanner
            .invoke(&ArtifactRef::path("/uploads/../../etc/passwd"))
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
    }
}
