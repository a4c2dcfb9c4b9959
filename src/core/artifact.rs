//! Artifact references and the input validation every adapter applies.
//!
//! An [`ArtifactRef`] names what is to be scanned: a path on disk, a
//! container image, or a repository location. Values that reach an external
//! process pass through [`ArtifactRef::validate`] first.

use crate::core::error::ScanError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// The three kinds of artifact the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// A file or directory on the local filesystem.
    #[serde(rename = "filesystem")]
    Filesystem,
    /// A container image reference.
    #[serde(rename = "image")]
    Image,
    /// A source repository location.
    #[serde(rename = "git")]
    Repository,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem => write!(f, "filesystem"),
            Self::Image => write!(f, "image"),
            Self::Repository => write!(f, "git"),
        }
    }
}

/// What is to be scanned.
///
/// # Examples
///
/// ```rust
/// use scanwarden::core::{ArtifactKind, ArtifactRef};
///
/// let image = ArtifactRef::image("library/alpine:3.20");
/// assert_eq!(image.kind(), ArtifactKind::Image);
/// assert!(image.validate().is_ok());
///
/// let sneaky = ArtifactRef::image("../../etc/passwd");
/// assert!(sneaky.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArtifactRef {
    /// A file or directory on disk.
    FilesystemPath(PathBuf),
    /// A container image name, e.g. `nginx:1.27`.
    ContainerImage(String),
    /// A repository URL, e.g. `https://github.com/org/repo.git`.
    RepositoryLocation(String),
}

impl ArtifactRef {
    /// Creates a filesystem reference.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::FilesystemPath(path.into())
    }

    /// Creates a container image reference.
    pub fn image(name: impl Into<String>) -> Self {
        Self::ContainerImage(name.into())
    }

    /// Creates a repository reference.
    pub fn repository(url: impl Into<String>) -> Self {
        Self::RepositoryLocation(url.into())
    }

    /// Returns the kind of this artifact.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::FilesystemPath(_) => ArtifactKind::Filesystem,
            Self::ContainerImage(_) => ArtifactKind::Image,
            Self::RepositoryLocation(_) => ArtifactKind::Repository,
        }
    }

    /// Returns the path, if this is a filesystem reference.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::FilesystemPath(path) => Some(path),
            _ => None,
        }
    }

    /// Returns the value as it would be handed to a tool.
    pub fn display_value(&self) -> String {
        match self {
            Self::FilesystemPath(path) => path.display().to_string(),
            Self::ContainerImage(name) => name.clone(),
            Self::RepositoryLocation(url) => url.clone(),
        }
    }

    /// Rejects values that could traverse paths or inject arguments.
    pub fn validate(&self) -> Result<(), ScanError> {
        match self {
            Self::FilesystemPath(path) => validate_path(path),
            Self::ContainerImage(name) => validate_image_reference(name),
            Self::RepositoryLocation(url) => validate_repository_url(url),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.display_value())
    }
}

impl From<PathBuf> for ArtifactRef {
    fn from(path: PathBuf) -> Self {
        Self::FilesystemPath(path)
    }
}

impl From<&Path> for ArtifactRef {
    fn from(path: &Path) -> Self {
        Self::FilesystemPath(path.to_path_buf())
    }
}

fn reject(value: &str, reason: &str) -> ScanError {
    tracing::warn!(value = %value, reason = %reason, "Rejected unsafe input");
    ScanError::invalid_input(value, reason)
}

fn check_common(value: &str) -> Result<(), ScanError> {
    if value.is_empty() {
        return Err(reject(value, "empty value"));
    }
    if value.contains("..") {
        return Err(reject(value, "contains '..'"));
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(reject(value, "contains control characters"));
    }
    Ok(())
}

/// Validates a bare name such as an uploaded filename.
///
/// Bare names must not be `.` or blank, must not contain `..`, `/` or `\`,
/// and must not look like a command-line option.
pub fn validate_bare_name(name: &str) -> Result<(), ScanError> {
    check_common(name)?;
    if name == "." || name.trim().is_empty() {
        return Err(reject(name, "does not name a file"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(reject(name, "contains a path separator"));
    }
    if name.starts_with('-') {
        return Err(reject(name, "starts with '-'"));
    }
    Ok(())
}

/// Validates a filesystem path handed to a tool.
pub fn validate_path(path: &Path) -> Result<(), ScanError> {
    let text = path.to_string_lossy();
    check_common(&text)?;
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(reject(&text, "contains a parent-directory component"));
    }
    if text.starts_with('-') {
        return Err(reject(&text, "starts with '-'"));
    }
    Ok(())
}

/// Validates a container image reference (`[registry/]repo[:tag][@digest]`).
pub fn validate_image_reference(name: &str) -> Result<(), ScanError> {
    check_common(name)?;
    if name.starts_with('-') || name.starts_with('/') {
        return Err(reject(name, "must start with an alphanumeric character"));
    }
    if name.contains('\\') {
        return Err(reject(name, "contains a backslash"));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | ':' | '@');
    if !name.chars().all(allowed) {
        return Err(reject(name, "contains characters outside an image reference"));
    }
    Ok(())
}

/// Validates a repository location.
///
/// Accepts `https://`, `http://`, `ssh://`, `git://` URLs and scp-style
/// `user@host:path` locations.
pub fn validate_repository_url(url: &str) -> Result<(), ScanError> {
    check_common(url)?;
    if url.starts_with('-') {
        return Err(reject(url, "starts with '-'"));
    }
    if url.chars().any(char::is_whitespace) || url.contains('\\') {
        return Err(reject(url, "contains whitespace or a backslash"));
    }
    const SCHEMES: [&str; 4] = ["https://", "http://", "ssh://", "git://"];
    let has_scheme = SCHEMES.iter().any(|s| url.starts_with(s));
    let scp_like = !url.contains("://")
        && url
            .split_once('@')
            .map(|(_, rest)| rest.contains(':'))
            .unwrap_or(false);
    if !has_scheme && !scp_like {
        return Err(reject(url, "unsupported repository location"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_display() {
        let artifact = ArtifactRef::repository("https://example.com/org/repo.git");
        assert_eq!(artifact.kind(), ArtifactKind::Repository);
        assert_eq!(artifact.to_string(), "git:https://example.com/org/repo.git");
        assert!(artifact.as_path().is_none());

        let artifact: ArtifactRef = PathBuf::from("/srv/uploads/a.bin").into();
        assert_eq!(artifact.as_path(), Some(Path::new("/srv/uploads/a.bin")));
    }

    #[test]
    fn test_traversal_rejected_for_every_kind() {
        let cases = [
            ArtifactRef::path("/srv/uploads/../etc/passwd"),
            ArtifactRef::path("../secret"),
            ArtifactRef::image("../alpine"),
            ArtifactRef::image("alpine/..:latest"),
            ArtifactRef::repository("https://example.com/../repo.git"),
        ];
        for case in cases {
            let err = case.validate().unwrap_err();
            assert!(err.is_invalid_input(), "{case} should be rejected");
        }
    }

    #[test]
    fn test_bare_name_rejects_separators() {
        for name in ["a/b", "a\\b", "..", "../x", "-rf", "", ".", "   "] {
            assert!(validate_bare_name(name).is_err(), "{name:?} should be rejected");
        }
        assert!(validate_bare_name("report.tar.gz").is_ok());
    }

    #[test]
    fn test_image_reference_grammar() {
        assert!(validate_image_reference("nginx").is_ok());
        assert!(validate_image_reference("ghcr.io/org/app:1.2.3").is_ok());
        assert!(validate_image_reference("alpine@sha256:abcdef0123").is_ok());
        assert!(validate_image_reference("--output=/tmp/x").is_err());
        assert!(validate_image_reference("alpine; rm -rf /").is_err());
        assert!(validate_image_reference("alpine$(id)").is_err());
    }

    #[test]
    fn test_repository_url_forms() {
        assert!(validate_repository_url("https://github.com/org/repo.git").is_ok());
        assert!(validate_repository_url("git@github.com:org/repo.git").is_ok());
        assert!(validate_repository_url("ssh://git@host/repo").is_ok());
        assert!(validate_repository_url("file:///etc").is_err());
        assert!(validate_repository_url("--upload-pack=touch /tmp/x").is_err());
        assert!(validate_repository_url("https://host/repo x").is_err());
    }
}
