//! Disease reference table.

use axum::Json;

use crate::models::{DiseaseInfo, DISEASES};

/// `GET /api/diseases`: the static disease vocabulary with treatments.
pub async fn list() -> Json<&'static [DiseaseInfo]> {
    Json(&DISEASES[..])
}
