//! BLAKE3 fingerprints for uploaded payloads.
//!
//! Review entries carry the digest of the upload that triggered them, so a
//! reviewer can match the entry to the uploaded file after the transient
//! copy has been cleaned up.

/// Computes BLAKE3 digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileHasher;

impl FileHasher {
    /// Creates a new hasher.
    pub fn new() -> Self {
        Self
    }

    /// Hashes in-memory bytes, returning a `blake3:<hex>` digest.
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        format!("blake3:{}", blake3::hash(data).to_hex())
    }
}
