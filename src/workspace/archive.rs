//! Archive detection and extraction.
//!
//! Formats are recognized by content, not by extension. Entries that would
//! land outside the destination (absolute paths, `..` components) fail the
//! whole extraction; links are skipped.

use crate::core::ExtractionError;

use async_trait::async_trait;
use std::fmt::Debug;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

/// Bytes read from the head of a file for sniffing.
const SNIFF_LEN: usize = 8192;

/// Archive formats that are unpacked before scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// PKZIP.
    Zip,
    /// POSIX tar.
    Tar,
    /// gzip-compressed tar.
    TarGz,
}

impl ArchiveFormat {
    /// Maps a sniffed MIME type to a format.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/zip" => Some(Self::Zip),
            "application/x-tar" => Some(Self::Tar),
            "application/gzip" => Some(Self::TarGz),
            _ => None,
        }
    }
}

/// Detects whether the file at `path` is an archive we unpack.
///
/// Directories and unrecognized content return `Ok(None)`.
pub fn detect_format(path: &Path) -> Result<Option<ArchiveFormat>, ExtractionError> {
    if !path.is_file() {
        return Ok(None);
    }
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?.take(SNIFF_LEN as u64).read_to_end(&mut head)?;

    let format = infer::get(&head).and_then(|kind| ArchiveFormat::from_mime(kind.mime_type()));
    tracing::debug!(path = %path.display(), format = ?format, "Sniffed file type");
    Ok(format)
}

/// Unpacks archives into a directory.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync + Debug {
    /// Returns the archive format of `path`, or `None` if it is not an archive.
    async fn detect(&self, path: &Path) -> Result<Option<ArchiveFormat>, ExtractionError>;

    /// Unpacks `archive` into `dest`, returning the number of files written.
    async fn extract(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        dest: &Path,
    ) -> Result<usize, ExtractionError>;
}

/// Extracts archives on the local filesystem with the `zip` and `tar` crates.
#[derive(Debug, Clone)]
pub struct LocalArchiveExtractor {
    /// Largest decompressed size accepted for one entry.
    pub max_entry_size: u64,

    /// Largest number of entries accepted in one archive.
    pub max_entries: usize,
}

impl Default for LocalArchiveExtractor {
    fn default() -> Self {
        Self {
            max_entry_size: 2 * 1024 * 1024 * 1024,
            max_entries: 100_000,
        }
    }
}

impl LocalArchiveExtractor {
    /// Creates an extractor with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-entry size limit.
    pub fn with_max_entry_size(mut self, bytes: u64) -> Self {
        self.max_entry_size = bytes;
        self
    }

    /// Sets the entry count limit.
    pub fn with_max_entries(mut self, count: usize) -> Self {
        self.max_entries = count;
        self
    }

    fn extract_blocking(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        dest: &Path,
    ) -> Result<usize, ExtractionError> {
        fs::create_dir_all(dest)?;
        let file = File::open(archive)?;
        match format {
            ArchiveFormat::Zip => self.extract_zip(file, dest),
            ArchiveFormat::Tar => self.extract_tar(BufReader::new(file), dest),
            ArchiveFormat::TarGz => {
                self.extract_tar(flate2::read::GzDecoder::new(BufReader::new(file)), dest)
            }
        }
    }

    fn extract_zip(&self, file: File, dest: &Path) -> Result<usize, ExtractionError> {
        let mut archive = zip::ZipArchive::new(file).map_err(corrupt)?;
        if archive.len() > self.max_entries {
            return Err(ExtractionError::Corrupt {
                reason: format!("{} entries exceeds limit of {}", archive.len(), self.max_entries),
            });
        }

        let mut written = 0;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(corrupt)?;
            let name = entry.name().to_string();

            // Zip Slip protection
            let relative = entry
                .enclosed_name()
                .ok_or_else(|| ExtractionError::UnsafeEntry { name: name.clone() })?;
            let out_path = dest.join(relative);

            if entry.unix_mode().is_some_and(|mode| mode & 0o170000 == 0o120000) {
                tracing::debug!(entry = %name, "Skipping symlink entry");
                continue;
            }
            if entry.is_dir() {
                fs::create_dir_all(&out_path)?;
                continue;
            }
            self.write_entry(&mut entry, &name, &out_path)?;
            written += 1;
        }
        Ok(written)
    }

    fn extract_tar<R: Read>(&self, reader: R, dest: &Path) -> Result<usize, ExtractionError> {
        let mut archive = tar::Archive::new(reader);
        let mut written = 0;
        let mut seen = 0;

        for entry in archive.entries().map_err(corrupt)? {
            let mut entry = entry.map_err(corrupt)?;
            seen += 1;
            if seen > self.max_entries {
                return Err(ExtractionError::Corrupt {
                    reason: format!("more than {} entries", self.max_entries),
                });
            }

            let raw_path = entry.path().map_err(corrupt)?.into_owned();
            let name = raw_path.display().to_string();
            let relative = enclosed(&raw_path).ok_or_else(|| ExtractionError::UnsafeEntry { name: name.clone() })?;
            let out_path = dest.join(relative);

            match entry.header().entry_type() {
                tar::EntryType::Directory => {
                    fs::create_dir_all(&out_path)?;
                }
                tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
                    self.write_entry(&mut entry, &name, &out_path)?;
                    written += 1;
                }
                other => {
                    tracing::debug!(entry = %name, kind = ?other, "Skipping non-file tar entry");
                }
            }
        }
        Ok(written)
    }

    fn write_entry<R: Read>(&self, reader: &mut R, name: &str, out_path: &Path) -> Result<(), ExtractionError> {
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(out_path)?;
        let copied = io::copy(&mut reader.take(self.max_entry_size + 1), &mut out)?;
        if copied > self.max_entry_size {
            return Err(ExtractionError::Corrupt {
                reason: format!("entry '{}' exceeds {} bytes", name, self.max_entry_size),
            });
        }
        Ok(())
    }
}

/// Returns `path` as a relative path with no parent or root components.
fn enclosed(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn corrupt(e: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Corrupt { reason: e.to_string() }
}

#[async_trait]
impl ArchiveExtractor for LocalArchiveExtractor {
    async fn detect(&self, path: &Path) -> Result<Option<ArchiveFormat>, ExtractionError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || detect_format(&path))
            .await
            .map_err(|e| ExtractionError::Io(io::Error::other(e)))?
    }

    async fn extract(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        dest: &Path,
    ) -> Result<usize, ExtractionError> {
        let this = self.clone();
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();

        let written = tokio::task::spawn_blocking(move || this.extract_blocking(&archive, format, &dest))
            .await
            .map_err(|e| ExtractionError::Io(io::Error::other(e)))??;

        tracing::debug!(files = written, format = ?format, "Archive extracted");
        Ok(written)
    }
}
