//! Axum router configuration with middleware.
//!
//! The trigger surface lives under `/v1/`; the executor webhook keeps its
//! own top-level path (`/agents/events`) to match the callback contract.
//! Middleware: CORS, tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        // Trigger admission
        .route(
            "/v1/agents/{agent_key}/trigger",
            post(handlers::trigger::trigger_agent),
        )
        // Executor webhook callbacks
        .route("/agents/events", post(handlers::events::ingest_event))
        // Run polling
        .route("/v1/runs/{run_id}", get(handlers::runs::get_run))
        .route("/v1/runs", get(handlers::runs::list_runs))
        // Catalog and health views
        .route("/v1/agents", get(handlers::agents::list_agents))
        .route(
            "/v1/agents/{agent_key}/health",
            get(handlers::agents::agent_health),
        )
        .route(
            "/v1/agents/{agent_key}/reset",
            post(handlers::agents::reset_agent),
        )
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple liveness check (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
