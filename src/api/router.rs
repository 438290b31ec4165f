//! Scan API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Layers (outermost → innermost): CORS → access log → body limit → handler.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the scan API router.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn scan_api_router(ctx: ApiContext) -> Router {
    let body_limit = ctx.max_upload_bytes;

    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/diseases", get(endpoints::diseases::list))
        .route("/upload-scan", post(endpoints::scans::upload))
        .route("/scans", get(endpoints::scans::list))
        .route(
            "/scans/:id",
            get(endpoints::scans::detail).put(endpoints::scans::update),
        )
        .route("/images/*key", get(endpoints::images::fetch))
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(middleware::access_log::log_access));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
}
