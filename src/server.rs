//! JSON HTTP surface for the route pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/analyze_route` | Run the pipeline for `{origin, destination}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response Contract
//!
//! `/analyze_route` always answers with the status envelope:
//!
//! ```json
//! { "status": "success", "data": [ { "step": 1, "mode": "Jeep", ... } ], "source": "https://..." }
//! { "status": "error", "message": "No relevant threads found." }
//! ```
//!
//! Pipeline outcomes, including errors, are HTTP 200. A body that is not
//! valid JSON, or an empty origin or destination, is HTTP 400 with the
//! same error envelope.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends
//! can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::knowledge::KnowledgeStore;
use crate::models::{RouteQuery, RouteResponse};
use crate::pipeline::RouteAnalyzer;

#[derive(Clone)]
struct AppState {
    analyzer: Arc<RouteAnalyzer>,
}

/// Load the knowledge store, wire the production pipeline, and serve on
/// `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let knowledge = Arc::new(KnowledgeStore::load(&config.knowledge)?);
    info!(
        documents = knowledge.documents().len(),
        chars = knowledge.reference_text().chars().count(),
        "reference text ready"
    );
    let analyzer = Arc::new(RouteAnalyzer::from_config(config, knowledge)?);
    run_server_with_analyzer(&config.server.bind, analyzer).await
}

/// Serve an already-built analyzer. Used by tests and embedders that
/// supply their own collaborators.
pub async fn run_server_with_analyzer(
    bind_addr: &str,
    analyzer: Arc<RouteAnalyzer>,
) -> anyhow::Result<()> {
    let app = router(analyzer);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(analyzer: Arc<RouteAnalyzer>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/analyze_route", post(handle_analyze_route))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { analyzer })
}

// ============ Error response ============

/// A request rejected before the pipeline ran.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(RouteResponse::error(self.message))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

// ============ Handlers ============

async fn handle_analyze_route(
    State(state): State<AppState>,
    body: Result<Json<RouteQuery>, JsonRejection>,
) -> Result<Json<RouteResponse>, AppError> {
    let Json(route) = body.map_err(|e| bad_request(e.body_text()))?;

    if route.origin.trim().is_empty() || route.destination.trim().is_empty() {
        return Err(bad_request("origin and destination must not be empty"));
    }

    info!(origin = %route.origin, destination = %route.destination, "analyze_route");
    Ok(Json(state.analyzer.respond(&route).await))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
