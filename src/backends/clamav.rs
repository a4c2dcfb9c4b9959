//! ClamAV antivirus backend.
//!
//! Two transports are supported:
//!
//! - **Cli** runs `clamscan --recursive` against the target path.
//! - **Daemon** (feature `clamd`) asks a running clamd to `MULTISCAN` the
//!   path over its Unix socket. clamd must be able to read the path.
//!
//! Both produce text in clamd's `<path>: <signature> FOUND` line format,
//! which the normalizer parses.

use crate::core::process::{probe_version, run_configured};
use crate::core::{
    AdapterConfig, ArtifactKind, ArtifactRef, RawOutput, ScanError, ScannerAdapter, ScannerKind,
};

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// How the adapter reaches ClamAV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClamAvTransport {
    /// Run the `clamscan` executable.
    Cli {
        /// Path to `clamscan`.
        program: PathBuf,
    },
    /// Talk to clamd over a Unix socket.
    Daemon {
        /// Path to the clamd socket.
        socket_path: PathBuf,
    },
}

/// ClamAV scanner configuration.
#[derive(Debug, Clone)]
pub struct ClamAvConfig {
    /// Transport to use.
    pub transport: ClamAvTransport,

    /// Connection timeout (daemon transport).
    pub connection_timeout: Duration,

    /// Scan timeout.
    pub scan_timeout: Duration,
}

impl Default for ClamAvConfig {
    fn default() -> Self {
        Self {
            transport: ClamAvTransport::Cli {
                program: PathBuf::from("clamscan"),
            },
            connection_timeout: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(600),
        }
    }
}

impl ClamAvConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the `clamscan` executable at `program`.
    pub fn with_cli(mut self, program: impl Into<PathBuf>) -> Self {
        self.transport = ClamAvTransport::Cli {
            program: program.into(),
        };
        self
    }

    /// Uses the clamd Unix socket at `path`.
    pub fn with_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.transport = ClamAvTransport::Daemon {
            socket_path: path.into(),
        };
        self
    }

    /// Sets the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }
}

/// CLI view of the configuration, for the shared process runner.
#[derive(Debug, Clone)]
struct ClamScanCli {
    program: PathBuf,
    timeout: Duration,
}

impl AdapterConfig for ClamScanCli {
    fn program(&self) -> &PathBuf {
        &self.program
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// ClamAV scanner implementation.
///
/// # Example
///
/// ```rust,ignore
/// use scanwarden::backends::{ClamAvConfig, ClamAvScanner};
///
/// let config = ClamAvConfig::new().with_socket("/var/run/clamav/clamd.sock");
/// let scanner = ClamAvScanner::new(config)?;
/// ```
#[derive(Debug)]
pub struct ClamAvScanner {
    config: ClamAvConfig,
}

impl ClamAvScanner {
    /// Creates a new ClamAV scanner with the given configuration.
    pub fn new(config: ClamAvConfig) -> Result<Self, ScanError> {
        if let ClamAvTransport::Daemon { .. } = config.transport {
            if !cfg!(all(feature = "clamd", unix)) {
                return Err(ScanError::configuration(
                    "clamd transport requires the `clamd` feature on a Unix platform",
                ));
            }
        }
        Ok(Self { config })
    }

    /// Creates a ClamAV scanner using `clamscan` from `PATH`.
    pub fn with_defaults() -> Self {
        Self {
            config: ClamAvConfig::default(),
        }
    }

    /// Returns the configured transport.
    pub fn transport(&self) -> &ClamAvTransport {
        &self.config.transport
    }

    fn cli_args(path: &std::path::Path) -> Vec<OsString> {
        vec![
            "--recursive".into(),
            "--stdout".into(),
            "--".into(),
            path.as_os_str().to_owned(),
        ]
    }

    async fn scan_cli(&self, program: &PathBuf, path: &std::path::Path) -> Result<RawOutput, ScanError> {
        let cli = ClamScanCli {
            program: program.clone(),
            timeout: self.config.scan_timeout,
        };
        // clamscan: 0 = clean, 1 = virus found, 2 = error
        run_configured("clamav", &cli, &Self::cli_args(path), &[0, 1]).await
    }

    #[cfg(all(feature = "clamd", unix))]
    async fn scan_daemon(&self, socket_path: &PathBuf, path: &std::path::Path) -> Result<RawOutput, ScanError> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let start = std::time::Instant::now();
        let connect = tokio::net::UnixStream::connect(socket_path);
        let mut stream = tokio::time::timeout(self.config.connection_timeout, connect)
            .await
            .map_err(|_| ScanError::timeout("clamav", self.config.connection_timeout))?
            .map_err(|e| ScanError::engine_unavailable("clamav", e.to_string()))?;

        let mut command = b"zMULTISCAN ".to_vec();
        command.extend_from_slice(path.as_os_str().as_encoded_bytes());
        command.push(0);

        let exchange = async {
            stream.write_all(&command).await?;
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await?;
            Ok::<_, std::io::Error>(response)
        };

        let response = tokio::time::timeout(self.config.scan_timeout, exchange)
            .await
            .map_err(|_| ScanError::timeout("clamav", start.elapsed()))?
            .map_err(|e| ScanError::engine_unavailable("clamav", e.to_string()))?;

        // z-prefixed replies are NUL-terminated; turn them into lines.
        let text = String::from_utf8_lossy(&response).replace('\0', "\n");
        let errors = text
            .lines()
            .filter(|line| line.trim_end().ends_with("ERROR"))
            .collect::<Vec<_>>()
            .join("\n");

        // FOUND lines stay in stdout even when other files errored.
        let output = if errors.is_empty() {
            RawOutput::completed("clamav", text)
        } else {
            RawOutput::abnormal("clamav", None, errors).with_stdout(text)
        };
        Ok(output.with_duration(start.elapsed()))
    }

    #[cfg(not(all(feature = "clamd", unix)))]
    async fn scan_daemon(&self, _socket_path: &PathBuf, _path: &std::path::Path) -> Result<RawOutput, ScanError> {
        Err(ScanError::configuration(
            "clamd transport requires the `clamd` feature on a Unix platform",
        ))
    }
}

#[async_trait]
impl ScannerAdapter for ClamAvScanner {
    fn name(&self) -> &str {
        "clamav"
    }

    fn kind(&self) -> ScannerKind {
        ScannerKind::Av
    }

    fn supports(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Filesystem
    }

    fn scan_label(&self, _target: &ArtifactRef) -> String {
        "ClamAV".to_string()
    }

    async fn invoke(&self, target: &ArtifactRef) -> Result<RawOutput, ScanError> {
        target.validate()?;
        let path = target
            .as_path()
            .ok_or_else(|| ScanError::internal("clamav only scans filesystem paths"))?;

        tracing::info!(engine = "clamav", path = %path.display(), "Running ClamAV scan");

        match &self.config.transport {
            ClamAvTransport::Cli { program } => self.scan_cli(program, path).await,
            ClamAvTransport::Daemon { socket_path } => self.scan_daemon(socket_path, path).await,
        }
    }

    async fn health_check(&self) -> Result<(), ScanError> {
        match &self.config.transport {
            ClamAvTransport::Cli { program } => probe_version("clamav", program).await,
            #[cfg(all(feature = "clamd", unix))]
            ClamAvTransport::Daemon { socket_path } => {
                use tokio::io::{AsyncReadExt, AsyncWriteExt};

                let mut stream = tokio::net::UnixStream::connect(socket_path)
                    .await
                    .map_err(|e| ScanError::engine_unavailable("clamav", e.to_string()))?;
                stream
                    .write_all(b"zPING\0")
                    .await
                    .map_err(|e| ScanError::engine_unavailable("clamav", e.to_string()))?;
                let mut response = String::new();
                stream
                    .read_to_string(&mut response)
                    .await
                    .map_err(|e| ScanError::engine_unavailable("clamav", e.to_string()))?;

                if response.trim_end_matches('\0').trim() == "PONG" {
                    Ok(())
                } else {
                    Err(ScanError::engine_unavailable(
                        "clamav",
                        format!("Unexpected response: {}", response),
                    ))
                }
            }
            #[cfg(not(all(feature = "clamd", unix)))]
            ClamAvTransport::Daemon { .. } => Err(ScanError::engine_unavailable(
                "clamav",
                "Health check not available",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClamAvConfig::new()
            .with_socket("/custom/path.sock")
            .with_scan_timeout(Duration::from_secs(60));

        assert_eq!(
            config.transport,
            ClamAvTransport::Daemon {
                socket_path: PathBuf::from("/custom/path.sock")
            }
        );
        assert_eq!(config.scan_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_filesystem_only() {
        let scanner = ClamAvScanner::with_defaults();
        assert!(scanner.supports(ArtifactKind::Filesystem));
        assert!(!scanner.supports(ArtifactKind::Image));
        assert!(!scanner.supports(ArtifactKind::Repository));
    }

    #[test]
    fn test_cli_args_end_with_path() {
        let args = ClamAvScanner::cli_args(std::path::Path::new("/srv/x"));
        assert_eq!(args.last().unwrap(), "/srv/x");
        assert!(args.contains(&OsString::from("--recursive")));
        // the `Infected files:` summary feeds the escalation fallback
        assert!(!args.contains(&OsString::from("--no-summary")));
    }

    #[test]
    fn test_cli_summary_escalates_without_found_lines() {
        use crate::core::ScanContext;
        use crate::normalize::normalize;
        use crate::policy::EscalationPolicy;

        let stdout = "----------- SCAN SUMMARY -----------\nScanned files: 4\nInfected files: 1\n";
        let result = normalize(ScannerKind::Av, "ClamAV", "/scan", &RawOutput::completed("clamav", stdout));
        assert!(result.detections.is_empty());

        let policy = EscalationPolicy::default_policy();
        assert_eq!(policy.matching_rule(&result).unwrap().id, "av-infected-summary");
        assert!(policy.evaluate(&result, &ScanContext::new()).is_some());
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_connect() {
        let scanner = ClamAvScanner::with_defaults();
        let err = scanner
            .invoke(&ArtifactRef::path("/srv/uploads/../../etc/shadow"))
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[cfg(all(feature = "clamd", unix))]
    #[tokio::test]
    async fn test_daemon_multiscan_exchange() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let dir = tempfile::TempDir::new().unwrap();
        let socket = dir.path().join("clamd.sock");
        let listener = tokio::net::UnixListener::bind(&socket).unwrap();

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let n = conn.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            conn.write_all(b"/scan/evil.com: Eicar-Test-Signature FOUND\0")
                .await
                .unwrap();
            request
        });

        let scanner = ClamAvScanner::new(ClamAvConfig::new().with_socket(&socket)).unwrap();
        let output = scanner.invoke(&ArtifactRef::path("/scan")).await.unwrap();

        assert!(output.completed_normally);
        assert!(output.stdout.contains("Eicar-Test-Signature FOUND"));
        assert!(server.await.unwrap().starts_with("zMULTISCAN /scan"));
    }

    #[cfg(all(feature = "clamd", unix))]
    #[tokio::test]
    async fn test_daemon_error_keeps_found_lines() {
        use crate::core::ScanContext;
        use crate::normalize::normalize;
        use crate::policy::EscalationPolicy;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let dir = tempfile::TempDir::new().unwrap();
        let socket = dir.path().join("clamd.sock");
        let listener = tokio::net::UnixListener::bind(&socket).unwrap();

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(b"/scan/evil.com: Eicar-Test-Signature FOUND\0/scan/locked: Permission denied. ERROR\0")
                .await
                .unwrap();
        });

        let scanner = ClamAvScanner::new(ClamAvConfig::new().with_socket(&socket)).unwrap();
        let output = scanner.invoke(&ArtifactRef::path("/scan")).await.unwrap();
        assert!(!output.completed_normally);
        assert_eq!(output.stderr, "/scan/locked: Permission denied. ERROR");

        let result = normalize(ScannerKind::Av, "ClamAV", "/scan", &output);
        assert!(!result.succeeded);
        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.detections[0].name, "Eicar-Test-Signature");

        let entry = EscalationPolicy::default_policy()
            .evaluate(&result, &ScanContext::new())
            .unwrap();
        assert_eq!(entry.detections, vec!["Eicar-Test-Signature"]);
    }
}
