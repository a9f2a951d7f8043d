//! JSON/CSV HTTP interface over the importer and the hierarchy queries.

mod handlers;
mod response;
mod server;

pub use response::error_response;
pub use server::{build_router, AppState, HttpServer};

/// Multipart field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "file";

/// Default and ceiling for `GET /api/imports?limit=`.
pub const DEFAULT_IMPORTS_LIMIT: usize = 20;
pub const MAX_IMPORTS_LIMIT: usize = 500;
