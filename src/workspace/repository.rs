//! Repository cloning.

use crate::core::artifact::validate_repository_url;
use crate::core::process::run_command;
use crate::core::ScanError;

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Produces a local working copy of a repository.
#[async_trait]
pub trait RepositoryCloner: Send + Sync + Debug {
    /// Clones `url` under `dest` and returns the checkout directory.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<PathBuf, ScanError>;
}

/// Clones with the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCloner {
    program: PathBuf,
    timeout: Duration,
    depth: Option<u32>,
}

impl Default for GitCloner {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
            timeout: Duration::from_secs(300),
            depth: Some(1),
        }
    }
}

impl GitCloner {
    /// Creates a cloner using `git` from `PATH` with a shallow clone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the executable path.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the clone timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the history depth; `None` clones everything.
    pub fn with_depth(mut self, depth: Option<u32>) -> Self {
        self.depth = depth;
        self
    }

    fn build_args(&self, url: &str, checkout: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["clone".into(), "--quiet".into()];
        if let Some(depth) = self.depth {
            args.push("--depth".into());
            args.push(depth.to_string().into());
        }
        args.push("--".into());
        args.push(url.into());
        args.push(checkout.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl RepositoryCloner for GitCloner {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<PathBuf, ScanError> {
        validate_repository_url(url)?;
        let checkout = dest.join("repo");

        let output = run_command("git", &self.program, &self.build_args(url, &checkout), self.timeout, &[0]).await?;
        if !output.completed_normally {
            return Err(ScanError::engine_unavailable("git", output.diagnostic()));
        }

        tracing::info!(url = %url, path = %checkout.display(), "Cloned repository");
        Ok(checkout)
    }
}
