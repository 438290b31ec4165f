//! Key-value image blob storage.
//!
//! The scan service only needs create/get/exists/delete by key. Two backends:
//! `FsBlobStore` (one file per key under a root directory) and
//! `MemoryBlobStore` (tests and ephemeral deployments).

pub mod fs;
pub mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Blob store lock poisoned")]
    LockPoisoned,
}

/// A blob as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// Strong validator derived from the content (quoted, HTTP-ready).
    pub etag: String,
}

impl StoredBlob {
    pub fn new(bytes: Vec<u8>, content_type: String) -> Self {
        let etag = compute_etag(&bytes);
        Self {
            bytes,
            content_type,
            etag,
        }
    }
}

/// Blob store abstraction
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` only if the key is free. Returns `false`
    /// and leaves the existing blob untouched when it is already taken.
    /// The check and the write are a single atomic step.
    fn create(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<bool, BlobError>;
    fn get(&self, key: &str) -> Result<Option<StoredBlob>, BlobError>;
    fn exists(&self, key: &str) -> Result<bool, BlobError>;
    fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// Reject keys that could escape the store root or address directories.
pub fn validate_key(key: &str) -> Result<(), BlobError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Base64 SHA-256 of the content, quoted per RFC 7232.
pub fn compute_etag(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    format!(
        "\"{}\"",
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
    )
}

/// Detect MIME type from file magic bytes (not extension or Content-Type header).
pub fn detect_mime_from_bytes(bytes: &[u8]) -> String {
    if bytes.len() < 4 {
        return "application/octet-stream".into();
    }

    // JPEG: FF D8 FF
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg".into();
    }
    // PNG: 89 50 4E 47
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return "image/png".into();
    }
    // WebP: RIFF....WEBP
    if bytes.len() >= 12 && bytes[..4] == *b"RIFF" && bytes[8..12] == *b"WEBP" {
        return "image/webp".into();
    }
    // HEIF/HEIC: ....ftyp at offset 4
    if bytes.len() >= 12 && bytes[4..8] == *b"ftyp" {
        if let Ok(brand) = std::str::from_utf8(&bytes[8..12]) {
            if brand.starts_with("heic") || brand.starts_with("heix") || brand.starts_with("mif1")
            {
                return "image/heic".into();
            }
        }
    }

    "application/octet-stream".into()
}

/// Content type for a stored blob: magic bytes first, then the key's extension.
pub fn content_type_for(key: &str, bytes: &[u8]) -> String {
    let sniffed = detect_mime_from_bytes(bytes);
    if sniffed != "application/octet-stream" {
        return sniffed;
    }
    mime_guess::from_path(key)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
