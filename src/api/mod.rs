//! HTTP surface of the scan record service.
//!
//! Routes are nested under `/api/`. Handlers are thin: they parse the
//! request, call `ScanService`, and map `ScanError` onto status codes.
//! The leaf validation engine does not run here; validation happens on the
//! capturing client.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::scan_api_router;
pub use server::{start_server_on, ScanApiServer, ServerError, ServerInfo};
pub use types::ApiContext;
