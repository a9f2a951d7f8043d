use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::Config;
use crate::db::Db;
use crate::error::{Result, RosterError};
use crate::ingest::Importer;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub(crate) db: Db,
    pub(crate) importer: Arc<Importer>,
    pub(crate) config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Db, config: Config) -> Self {
        let importer = Arc::new(Importer::new(db.clone(), config.ingest.clone()));
        Self {
            db,
            importer,
            config: Arc::new(config),
        }
    }
}

/// Build the axum router for the roster API.
pub fn build_router(state: AppState) -> Router {
    let allowed_origins = &state.config.http_server.allowed_origins;

    // Empty list means local development: allow any origin
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let body_limit = state.config.ingest.max_upload_bytes;

    Router::new()
        .route("/api/employees", get(handlers::list_employees))
        .route("/api/employees/import", post(handlers::import_employees))
        .route("/api/employees/export", get(handlers::export_employees))
        .route("/api/employees/:id/subtree", get(handlers::employee_subtree))
        .route("/api/employees/:id/chain", get(handlers::employee_chain))
        .route("/api/imports", get(handlers::list_imports))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// HTTP server wrapper
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    pub fn new(db: Db, config: Config) -> Self {
        Self {
            state: AppState::new(db, config),
        }
    }

    /// Bind and serve until the process is stopped.
    pub async fn run(&self) -> Result<()> {
        let http = &self.state.config.http_server;
        let addr = format!("{}:{}", http.host, http.port);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            RosterError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Starting roster HTTP server on http://{}", addr);
        log::info!("Import endpoint: http://{}/api/employees/import", addr);

        axum::serve(listener, build_router(self.state.clone()))
            .await
            .map_err(|e| {
                RosterError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("HTTP server error: {}", e),
                ))
            })?;

        Ok(())
    }
}
