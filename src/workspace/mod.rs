//! Transient workspaces and the collaborators that fill them.
//!
//! A [`TempWorkspace`] is a scratch directory removed when dropped, on every
//! exit path. The dispatcher puts archive extractions, image exports and
//! repository clones in one and scans its contents.
//!
//! - [`archive`] - Content-sniffed extraction of zip, tar and tar.gz
//! - [`image`] - Exporting a container image to a tarball
//! - [`repository`] - Cloning a repository

pub mod archive;
pub mod image;
pub mod repository;

pub use archive::{ArchiveExtractor, ArchiveFormat, LocalArchiveExtractor};
pub use image::{DockerImageExporter, ImageExporter};
pub use repository::{GitCloner, RepositoryCloner};

use crate::core::ScanError;

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch directory that is deleted when dropped.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    /// Creates a workspace under `base`, or the system temp dir when `None`.
    pub fn create(base: Option<&Path>, prefix: &str) -> Result<Self, ScanError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match base {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                builder.tempdir_in(base)?
            }
            None => builder.tempdir()?,
        };
        tracing::debug!(path = %dir.path().display(), "Created workspace");
        Ok(Self { dir })
    }

    /// Returns the workspace root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns a path inside the workspace.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Creates a subdirectory and returns its path.
    pub fn subdir(&self, name: &str) -> Result<PathBuf, ScanError> {
        let path = self.join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Removes the workspace now, reporting failures instead of ignoring them.
    pub fn close(self) -> Result<(), ScanError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!(path = %path.display(), "Removed workspace");
        Ok(())
    }
}
