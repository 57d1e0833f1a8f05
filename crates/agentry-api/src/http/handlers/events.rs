//! Webhook event endpoint handler.
//!
//! `POST /agents/events`. Executors post signed progress/completion events
//! here. Applied, duplicate, and ignored events all acknowledge with 200;
//! the body says which.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use uuid::Uuid;

use agentry_core::ingest::{EventHeaders, IngestOutcome};

use crate::http::error::AppError;
use crate::http::handlers::header_string;
use crate::state::AppState;

/// POST /agents/events - Ingest an executor callback event.
pub async fn ingest_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event_headers = EventHeaders {
        signature: header_string(&headers, "x-signature"),
        idempotency_key: header_string(&headers, "x-idempotency-key"),
        correlation_id: header_string(&headers, "x-correlation-id"),
    };
    let correlation_id = event_headers
        .correlation_id
        .clone()
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    match state.ingestor.ingest(&event_headers, &body).await {
        Ok(IngestOutcome::Applied { run }) => Json(json!({
            "status": "applied",
            "run_id": run.run_id,
            "run_status": run.status,
            "progress": run.progress,
        }))
        .into_response(),
        Ok(IngestOutcome::Duplicate { run_id }) => Json(json!({
            "status": "duplicate",
            "run_id": run_id,
        }))
        .into_response(),
        Ok(IngestOutcome::Ignored { run, reason }) => Json(json!({
            "status": "ignored",
            "reason": reason,
            "run_id": run.run_id,
            "run_status": run.status,
        }))
        .into_response(),
        Err(err) => AppError::from_event(err, &correlation_id).into_response(),
    }
}
