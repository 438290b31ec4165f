use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::DiseaseLabel;

/// One persisted capture: where its image lives and what was detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: i64,
    pub image_key: String,
    pub disease_detected: Option<DiseaseLabel>,
    pub confidence_score: Option<f64>,
    pub recommendations: Option<String>,
    pub scan_location: Option<String>,
    pub user_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update body for `PUT /api/scans/:id`.
///
/// Absent (or null) fields leave the stored value untouched. The label is
/// kept as raw text so unknown values surface as validation errors instead
/// of opaque decode failures. Extra fields such as `image_key` are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease_detected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_notes: Option<String>,
}

/// Fields of a `ScanUpdate` after validation, ready to persist.
#[derive(Debug, Clone, Default)]
pub struct ValidatedUpdate {
    pub disease_detected: Option<DiseaseLabel>,
    pub confidence_score: Option<f64>,
    pub recommendations: Option<String>,
    pub scan_location: Option<String>,
    pub user_notes: Option<String>,
}
