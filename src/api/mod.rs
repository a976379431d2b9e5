//! Consumer API: Axum server exposing the sync snapshot.
//!
//! Read-only JSON views of the engine state plus the one mutator,
//! `PATCH /api/filters`. CORS is open for browser frontends.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use routes::AppState;

/// Bind `port` and serve the API in a background task.
pub async fn spawn_api(state: AppState, port: u16) -> Result<JoinHandle<()>> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {port}"))?;
    info!(port, "API server listening on http://localhost:{port}");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server error");
        }
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/snapshot", get(routes::get_snapshot))
        .route("/api/risks", get(routes::get_risks))
        .route("/api/risks/filtered", get(routes::get_filtered_risks))
        .route("/api/signals", get(routes::get_signals))
        .route(
            "/api/filters",
            get(routes::get_filters).patch(routes::patch_filters),
        )
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
