//! Scan record service: durable storage and retrieval of scans and their images.
//!
//! Every operation is an independent read or write against the blob store
//! and the `scan_results` table. Concurrent updates to one record are
//! last-write-wins.

pub mod keys;

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

use crate::blob::{detect_mime_from_bytes, BlobError, BlobStore, StoredBlob};
use crate::db::{self, DatabaseError};
use crate::models::{DiseaseLabel, ScanRecord, ScanUpdate, ValidatedUpdate};

pub use keys::{normalize_image_key, sanitize_filename};

/// Default and maximum page size for `list_records`.
pub const MAX_LIST_LIMIT: u32 = 50;

/// Tokenised keys tried after the primary key is taken.
const KEY_ATTEMPTS: usize = 8;

/// Upper bound on free-text fields.
pub const MAX_TEXT_CHARS: usize = 2000;

/// Image payloads accepted on upload, checked by magic bytes.
pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/heic"];

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl From<DatabaseError> for ScanError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                ScanError::NotFound(format!("{entity_type} {id}"))
            }
            other => ScanError::Storage(other.to_string()),
        }
    }
}

impl From<BlobError> for ScanError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidKey(key) => ScanError::Input(format!("invalid image key '{key}'")),
            other => ScanError::Storage(other.to_string()),
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedScan {
    pub scan_id: i64,
    pub image_key: String,
}

pub struct ScanService {
    blobs: Arc<dyn BlobStore>,
    conn: Mutex<Connection>,
}

impl ScanService {
    pub fn new(blobs: Arc<dyn BlobStore>, conn: Connection) -> Self {
        Self {
            blobs,
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, ScanError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ScanError::Storage("database lock poisoned".into()))?;
        Ok(f(&conn)?)
    }

    /// Store the image under a fresh key and create a pending scan record.
    ///
    /// The blob is written first; if the row insert fails the blob this call
    /// created is removed again.
    pub fn upload_image(&self, bytes: &[u8], filename: &str) -> Result<UploadedScan, ScanError> {
        if bytes.is_empty() {
            return Err(ScanError::Input("No image file provided".into()));
        }
        let content_type = detect_mime_from_bytes(bytes);
        if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
            return Err(ScanError::Input(
                "File type not supported. Please upload a JPEG, PNG, WebP or HEIC photo.".into(),
            ));
        }

        let now = Utc::now();
        let image_key = self.reserve_key(now.timestamp_millis(), filename, bytes, &content_type)?;

        let inserted = self.with_conn(|conn| db::insert_pending_scan(conn, &image_key, &now));
        let scan_id = match inserted {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&image_key) {
                    tracing::warn!(key = %image_key, "Orphan blob cleanup failed: {cleanup}");
                }
                return Err(e);
            }
        };

        tracing::info!(scan_id, key = %image_key, size = bytes.len(), "Scan uploaded");
        Ok(UploadedScan { scan_id, image_key })
    }

    /// Claim a key that no other blob holds and write the image under it.
    fn reserve_key(
        &self,
        millis: i64,
        filename: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, ScanError> {
        let primary = keys::scan_key(millis, filename);
        if self.blobs.create(&primary, bytes, content_type)? {
            return Ok(primary);
        }
        for _ in 0..KEY_ATTEMPTS {
            let key = keys::scan_key_with_token(millis, filename);
            if self.blobs.create(&key, bytes, content_type)? {
                return Ok(key);
            }
        }
        Err(ScanError::Storage(format!(
            "no free image key for '{primary}' after {KEY_ATTEMPTS} attempts"
        )))
    }

    /// Apply analysis results or user edits. Always advances `updated_at`.
    pub fn update_record(&self, id: i64, update: &ScanUpdate) -> Result<(), ScanError> {
        let validated = validate_update(update)?;

        self.with_conn(|conn| {
            let existing = db::get_scan(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
                entity_type: "scan".into(),
                id: id.to_string(),
            })?;
            // Clock skew or sub-microsecond updates must not produce a
            // non-increasing updated_at.
            let floor = existing.updated_at + Duration::microseconds(1);
            let now = Utc::now().max(floor);
            db::update_scan(conn, id, &validated, &now)
        })?;

        tracing::info!(scan_id = id, "Scan updated");
        Ok(())
    }

    /// Most recent first, capped at `MAX_LIST_LIMIT`. A limit of 0 is rejected.
    pub fn list_records(&self, limit: Option<u32>) -> Result<Vec<ScanRecord>, ScanError> {
        let limit = match limit {
            None => MAX_LIST_LIMIT,
            Some(0) => return Err(ScanError::Input("limit must be at least 1".into())),
            Some(n) => n.min(MAX_LIST_LIMIT),
        };
        self.with_conn(|conn| db::list_scans(conn, limit))
    }

    pub fn get_record(&self, id: i64) -> Result<ScanRecord, ScanError> {
        self.with_conn(|conn| db::get_scan(conn, id))?
            .ok_or_else(|| ScanError::NotFound(format!("scan {id}")))
    }

    /// Fetch an image by key (with or without the `scans/` prefix).
    pub fn get_image(&self, key: &str) -> Result<StoredBlob, ScanError> {
        let key = normalize_image_key(key);
        self.blobs
            .get(&key)?
            .ok_or_else(|| ScanError::NotFound(format!("image {key}")))
    }
}

/// Check an update against the record schema.
pub fn validate_update(update: &ScanUpdate) -> Result<ValidatedUpdate, ScanError> {
    let disease_detected = update
        .disease_detected
        .as_deref()
        .map(|raw| {
            DiseaseLabel::from_str(raw.trim())
                .map_err(|_| ScanError::Validation(format!("unknown disease label '{raw}'")))
        })
        .transpose()?;

    if let Some(score) = update.confidence_score {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(ScanError::Validation(format!(
                "confidence_score must be between 0 and 1, got {score}"
            )));
        }
    }

    for (field, value) in [
        ("recommendations", &update.recommendations),
        ("scan_location", &update.scan_location),
        ("user_notes", &update.user_notes),
    ] {
        if let Some(text) = value {
            if text.chars().count() > MAX_TEXT_CHARS {
                return Err(ScanError::Validation(format!(
                    "{field} exceeds {MAX_TEXT_CHARS} characters"
                )));
            }
        }
    }

    Ok(ValidatedUpdate {
        disease_detected,
        confidence_score: update.confidence_score,
        recommendations: update.recommendations.clone(),
        scan_location: update.scan_location.clone(),
        user_notes: update.user_notes.clone(),
    })
}
