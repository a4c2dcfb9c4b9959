//! Service configuration.
//!
//! [`ServiceConfig`] collects the folders, tool locations and timeouts a
//! [`ScanService`](crate::manager::ScanService) is wired from. Values come
//! from builders or from the process environment:
//!
//! | Variable | Default |
//! |---|---|
//! | `UPLOAD_FOLDER` | `/app/uploads` |
//! | `SCAN_RESULTS_FOLDER` | `/app/scan-results` |
//! | `YARA_RULES_PATH` | `/opt/yara/malware_index.yar` |
//! | `CLAMD_SOCKET` | unset (use `clamscan`) |
//! | `SCAN_TIMEOUT_SECS` | `600` |
//! | `TRIVY_BIN`, `GRYPE_BIN`, `CLAMSCAN_BIN`, `YARA_BIN`, `DOCKER_BIN`, `GIT_BIN` | tool name on `PATH` |
//! | `PERSIST_RAW_REPORTS` | `false` |

use crate::backends::yara::DEFAULT_RULES_PATH;
use crate::core::ScanError;

use std::path::PathBuf;
use std::time::Duration;

/// Name of the review queue file inside the results folder.
pub const REVIEW_FILE_NAME: &str = "review.json";

/// Configuration for a scan service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Where uploaded files are staged.
    pub upload_dir: PathBuf,

    /// Where the review queue and raw reports live.
    pub results_dir: PathBuf,

    /// YARA rules file.
    pub yara_rules_path: PathBuf,

    /// clamd socket; when unset ClamAV runs through `clamscan`.
    pub clamd_socket: Option<PathBuf>,

    /// Time budget for one adapter invocation.
    pub scan_timeout: Duration,

    /// Trivy executable.
    pub trivy_bin: PathBuf,

    /// Grype executable.
    pub grype_bin: PathBuf,

    /// clamscan executable.
    pub clamscan_bin: PathBuf,

    /// YARA executable.
    pub yara_bin: PathBuf,

    /// Docker executable, for image export.
    pub docker_bin: PathBuf,

    /// Git executable, for repository clones.
    pub git_bin: PathBuf,

    /// Whether raw tool output is written to the results folder.
    pub persist_raw_reports: bool,

    /// Maximum size of one uploaded file.
    pub max_upload_size: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("/app/uploads"),
            results_dir: PathBuf::from("/app/scan-results"),
            yara_rules_path: PathBuf::from(DEFAULT_RULES_PATH),
            clamd_socket: None,
            scan_timeout: Duration::from_secs(600),
            trivy_bin: PathBuf::from("trivy"),
            grype_bin: PathBuf::from("grype"),
            clamscan_bin: PathBuf::from("clamscan"),
            yara_bin: PathBuf::from("yara"),
            docker_bin: PathBuf::from("docker"),
            git_bin: PathBuf::from("git"),
            persist_raw_reports: false,
            max_upload_size: 100 * 1024 * 1024, // 100 MB
        }
    }
}

impl ServiceConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a numeric or boolean variable is malformed.
    pub fn from_env() -> Result<Self, ScanError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, with defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ScanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = var("UPLOAD_FOLDER") {
            config.upload_dir = dir.into();
        }
        if let Some(dir) = var("SCAN_RESULTS_FOLDER") {
            config.results_dir = dir.into();
        }
        if let Some(path) = var("YARA_RULES_PATH") {
            config.yara_rules_path = path.into();
        }
        config.clamd_socket = var("CLAMD_SOCKET").map(PathBuf::from);

        if let Some(secs) = var("SCAN_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ScanError::configuration(format!("SCAN_TIMEOUT_SECS must be a number of seconds, got '{}'", secs))
            })?;
            if secs == 0 {
                return Err(ScanError::configuration("SCAN_TIMEOUT_SECS must be positive"));
            }
            config.scan_timeout = Duration::from_secs(secs);
        }

        for (key, slot) in [
            ("TRIVY_BIN", &mut config.trivy_bin),
            ("GRYPE_BIN", &mut config.grype_bin),
            ("CLAMSCAN_BIN", &mut config.clamscan_bin),
            ("YARA_BIN", &mut config.yara_bin),
            ("DOCKER_BIN", &mut config.docker_bin),
            ("GIT_BIN", &mut config.git_bin),
        ] {
            if let Some(program) = var(key) {
                *slot = program.into();
            }
        }

        if let Some(flag) = var("PERSIST_RAW_REPORTS") {
            config.persist_raw_reports = parse_flag(&flag).ok_or_else(|| {
                ScanError::configuration(format!("PERSIST_RAW_REPORTS must be a boolean, got '{}'", flag))
            })?;
        }

        tracing::debug!(
            upload_dir = %config.upload_dir.display(),
            results_dir = %config.results_dir.display(),
            clamd = config.clamd_socket.is_some(),
            timeout_secs = config.scan_timeout.as_secs(),
            "Loaded service configuration"
        );
        Ok(config)
    }

    /// Sets the upload folder.
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Sets the results folder.
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    /// Sets the YARA rules file.
    pub fn with_yara_rules_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.yara_rules_path = path.into();
        self
    }

    /// Routes ClamAV through a clamd socket.
    pub fn with_clamd_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.clamd_socket = Some(path.into());
        self
    }

    /// Sets the per-adapter timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Enables or disables raw report persistence.
    pub fn with_persist_raw_reports(mut self, enabled: bool) -> Self {
        self.persist_raw_reports = enabled;
        self
    }

    /// Sets the maximum upload size.
    pub fn with_max_upload_size(mut self, size: u64) -> Self {
        self.max_upload_size = size;
        self
    }

    /// Returns the review queue file.
    pub fn review_file(&self) -> PathBuf {
        self.results_dir.join(REVIEW_FILE_NAME)
    }

    /// Returns where raw reports go, if they are persisted at all.
    pub fn report_dir(&self) -> Option<PathBuf> {
        self.persist_raw_reports.then(|| self.results_dir.clone())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
