//! Image retrieval with HTTP cache validation.

use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

/// Keys embed an upload timestamp and never change content.
pub const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// `GET /api/images/*key`: raw bytes, or 304 when the client copy is current.
pub async fn fetch(
    State(ctx): State<ApiContext>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let blob = ctx.scans.get_image(&key)?;

    let not_modified = headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|value| etag_matches(value, &blob.etag));

    if not_modified {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [
                (ETAG, blob.etag),
                (CACHE_CONTROL, IMAGE_CACHE_CONTROL.to_string()),
            ],
        )
            .into_response());
    }

    Ok((
        [
            (CONTENT_TYPE, blob.content_type),
            (ETAG, blob.etag),
            (CACHE_CONTROL, IMAGE_CACHE_CONTROL.to_string()),
        ],
        blob.bytes,
    )
        .into_response())
}

/// Weak comparison per RFC 7232 §3.2: `W/` prefixes are ignored, `*` matches.
fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let strip = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    let current = strip(etag);
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || strip(candidate) == current)
}
