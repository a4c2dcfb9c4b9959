//! JSON file review storage.

use crate::core::error::{ReviewError, ReviewResult};
use crate::review::record::ReviewEntry;
use crate::review::traits::ReviewStore;

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stores the review collection as one JSON array document.
///
/// Writes go to a temporary file in the same directory which is then
/// renamed over the document, so a reader never sees a half-written file.
///
/// # File Format
///
/// ```text
/// [
///   {"id": "…", "scan_type": "ClamAV", "path": "upload.zip", "status": "Pending Review", …},
///   …
/// ]
/// ```
///
/// Documents written before entries carried ids are migrated on open.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    canonical: PathBuf,
}

impl JsonFileStore {
    /// Opens the store at `path`, creating the parent directory if needed.
    ///
    /// Existing entries without an id are assigned one and the document is
    /// rewritten.
    pub fn open(path: impl Into<PathBuf>) -> ReviewResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ReviewError::store_fault(format!("Failed to create directory {}: {}", parent.display(), e))
            })?;
        }

        let (entries, migrated) = read_entries(&path)?;
        if migrated {
            write_entries(&path, &entries)?;
            tracing::info!(path = %path.display(), count = entries.len(), "Migrated legacy review entries");
        }

        let canonical = canonical_path(&path);
        Ok(Self { path, canonical })
    }

    /// Returns the document path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Resolves the directory so that different spellings of one document agree.
fn canonical_path(path: &Path) -> PathBuf {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match (std::fs::canonicalize(dir), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

/// Reads the document. Returns whether any entry had to be migrated.
fn read_entries(path: &Path) -> ReviewResult<(Vec<ReviewEntry>, bool)> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), false)),
        Err(e) => {
            return Err(ReviewError::store_fault(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };
    if content.trim().is_empty() {
        return Ok((Vec::new(), false));
    }

    let values: Vec<serde_json::Value> = serde_json::from_str(&content).map_err(|e| {
        ReviewError::store_fault(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    let mut migrated = false;
    let mut entries = Vec::with_capacity(values.len());
    for value in values {
        if value.get("id").is_none() {
            migrated = true;
        }
        let mut entry: ReviewEntry = serde_json::from_value(value).map_err(|e| {
            ReviewError::store_fault(format!("Malformed review entry in {}: {}", path.display(), e))
        })?;
        if entry.target.is_empty() {
            entry.target = entry.path.clone();
        }
        entries.push(entry);
    }

    Ok((entries, migrated))
}

fn write_entries(path: &Path, entries: &[ReviewEntry]) -> ReviewResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| ReviewError::store_fault(format!("Failed to create temp file: {}", e)))?;
    serde_json::to_writer_pretty(&mut file, entries)
        .map_err(|e| ReviewError::store_fault(format!("Failed to serialize reviews: {}", e)))?;
    file.flush()
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| ReviewError::store_fault(format!("Failed to write reviews: {}", e)))?;
    file.persist(path)
        .map_err(|e| ReviewError::store_fault(format!("Failed to replace {}: {}", path.display(), e.error)))?;
    Ok(())
}

#[async_trait]
impl ReviewStore for JsonFileStore {
    async fn load(&self) -> ReviewResult<Vec<ReviewEntry>> {
        let path = self.path.clone();
        let (entries, _) = tokio::task::spawn_blocking(move || read_entries(&path))
            .await
            .map_err(|e| ReviewError::store_fault(format!("Review load task failed: {}", e)))??;
        Ok(entries)
    }

    async fn save(&self, entries: &[ReviewEntry]) -> ReviewResult<()> {
        let path = self.path.clone();
        let entries = entries.to_vec();
        tokio::task::spawn_blocking(move || write_entries(&path, &entries))
            .await
            .map_err(|e| ReviewError::store_fault(format!("Review save task failed: {}", e)))??;

        tracing::debug!(path = %self.path.display(), "Saved review entries");
        Ok(())
    }

    fn lock_key(&self) -> Option<PathBuf> {
        Some(self.canonical.clone())
    }
}
