//! Container image export.

use crate::core::artifact::validate_image_reference;
use crate::core::process::run_command;
use crate::core::ScanError;

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Produces a filesystem view of a container image.
#[async_trait]
pub trait ImageExporter: Send + Sync + Debug {
    /// Exports `image` into `dest` and returns the path to scan.
    async fn export(&self, image: &str, dest: &Path) -> Result<PathBuf, ScanError>;
}

/// Exports images with `docker save`.
///
/// The result is the image tarball; antivirus engines unpack it themselves.
#[derive(Debug, Clone)]
pub struct DockerImageExporter {
    program: PathBuf,
    timeout: Duration,
}

impl Default for DockerImageExporter {
    fn default() -> Self {
        Self {
            program: PathBuf::from("docker"),
            timeout: Duration::from_secs(600),
        }
    }
}

impl DockerImageExporter {
    /// Creates an exporter using `docker` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the executable path.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the export timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ImageExporter for DockerImageExporter {
    async fn export(&self, image: &str, dest: &Path) -> Result<PathBuf, ScanError> {
        validate_image_reference(image)?;
        let tarball = dest.join("image.tar");

        let args: Vec<OsString> = vec![
            "save".into(),
            "--output".into(),
            tarball.as_os_str().to_owned(),
            "--".into(),
            image.into(),
        ];
        let output = run_command("docker", &self.program, &args, self.timeout, &[0]).await?;
        if !output.completed_normally {
            return Err(ScanError::engine_unavailable("docker", output.diagnostic()));
        }

        tracing::info!(image = %image, path = %tarball.display(), "Exported image");
        Ok(tarball)
    }
}
