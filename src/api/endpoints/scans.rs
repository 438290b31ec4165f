//! Scan record endpoints: upload, list, detail, update.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{
    ApiContext, ScanDetailResponse, ScanListResponse, SuccessResponse, UploadResponse,
};
use crate::models::ScanUpdate;

/// Multipart field carrying the photo.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
}

/// `POST /api/upload-scan`: store the photo and create a pending record.
pub async fn upload(
    State(ctx): State<ApiContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        image = Some((filename, bytes));
    }

    let (filename, bytes) =
        image.ok_or_else(|| ApiError::BadRequest("No image file provided".into()))?;

    let uploaded = ctx.scans.upload_image(&bytes, &filename)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            scan_id: uploaded.scan_id,
            image_key: uploaded.image_key,
        }),
    ))
}

/// `GET /api/scans?limit=N`: most recent first.
pub async fn list(
    State(ctx): State<ApiContext>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ScanListResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let scans = ctx.scans.list_records(params.limit)?;
    Ok(Json(ScanListResponse { scans }))
}

/// `GET /api/scans/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<ScanDetailResponse>, ApiError> {
    let id = parse_scan_id(&id)?;
    let scan = ctx.scans.get_record(id)?;
    Ok(Json(ScanDetailResponse { scan }))
}

/// `PUT /api/scans/:id`: apply detection results or user edits.
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    payload: Result<Json<ScanUpdate>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_scan_id(&id)?;
    let Json(update) = payload?;
    ctx.scans.update_record(id, &update)?;
    Ok(Json(SuccessResponse { success: true }))
}

fn parse_scan_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("Invalid scan ID: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_id_must_be_integer() {
        assert_eq!(parse_scan_id("42").unwrap(), 42);
        assert!(matches!(parse_scan_id("abc"), Err(ApiError::BadRequest(_))));
        assert!(parse_scan_id("4.2").is_err());
    }
}
