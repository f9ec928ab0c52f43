//! HTTP server for natural-language search.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/nl-search` | Answer a question against the corpus |
//! | `GET`  | `/health` | Status, version, and index readiness |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "Failed to generate answer", "code": "RATE_LIMIT", "detail": "...", "diagnostics": { ... } }
//! ```
//!
//! Status codes: `RATE_LIMIT` (429), `AUTH` (401), `TIMEOUT` (504),
//! `INVALID_REQUEST` (400), everything else 500.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! on another origin can call the API.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{ErrorKind, QueryError};
use crate::pipeline::{run_query, QueryEngine, QueryRequest, QueryResponse};

#[derive(Clone)]
struct AppState {
    engine: Arc<QueryEngine>,
}

/// Load the corpus, construct providers, and serve on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let engine = QueryEngine::from_config(config.clone())?;
    run_server_with_engine(Arc::new(engine), &bind_addr).await
}

/// Serve an already-built engine. Used by tests with mock providers.
pub async fn run_server_with_engine(engine: Arc<QueryEngine>, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "nl-search server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(engine: Arc<QueryEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/nl-search", post(handle_nl_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { engine })
}

// ============ Error response ============

/// Converts a [`QueryError`] into its JSON error response.
struct AppError(QueryError);

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_body())).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    index_ready: bool,
    corpus: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    built_at: Option<DateTime<Utc>>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let index = state.engine.index();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        index_ready: index.is_some(),
        corpus: state.engine.corpus_len(),
        fingerprint: index.as_ref().map(|i| i.fingerprint.clone()),
        built_at: index.as_ref().map(|i| i.built_at),
    })
}

// ============ POST /api/nl-search ============

async fn handle_nl_search(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(request) = body.map_err(|rejection| {
        QueryError::new(ErrorKind::InvalidRequest, "Invalid request body")
            .with_detail(rejection.body_text())
    })?;

    let response = run_query(state.engine.clone(), request).await?;
    Ok(Json(response))
}
