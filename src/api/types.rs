//! Shared types for the scan API layer.

use std::sync::Arc;

use serde::Serialize;

use crate::models::ScanRecord;
use crate::scans::ScanService;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub scans: Arc<ScanService>,
    /// Request body ceiling for uploads, in bytes.
    pub max_upload_bytes: usize,
}

impl ApiContext {
    pub fn new(scans: Arc<ScanService>, max_upload_bytes: usize) -> Self {
        Self {
            scans,
            max_upload_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub scan_id: i64,
    pub image_key: String,
}

#[derive(Debug, Serialize)]
pub struct ScanListResponse {
    pub scans: Vec<ScanRecord>,
}

#[derive(Debug, Serialize)]
pub struct ScanDetailResponse {
    pub scan: ScanRecord,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}
