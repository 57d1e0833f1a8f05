//! Trigger endpoint handler.
//!
//! `POST /v1/agents/{agent_key}/trigger`. The handler is a thin adapter:
//! it lifts headers into `TriggerHeaders`, delegates to the dispatcher,
//! and shapes the response. Duplicate, budget-stopped, and dry-run
//! responses share the same body schema as admissions, differing only in
//! `status`/`preview` -- clients need no special-case handling.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use agentry_core::cost::format_eur;
use agentry_core::dispatch::{Disposition, TriggerHeaders, TriggerOutcome};

use crate::http::error::AppError;
use crate::http::handlers::header_string;
use crate::state::AppState;

/// POST /v1/agents/{agent_key}/trigger - Admit or reject a trigger request.
pub async fn trigger_agent(
    State(state): State<AppState>,
    Path(agent_key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();

    let trigger_headers = TriggerHeaders {
        authorization: header_string(&headers, "authorization"),
        correlation_id: header_string(&headers, "x-correlation-id"),
        idempotency_key: header_string(&headers, "idempotency-key"),
        timestamp: header_string(&headers, "x-timestamp"),
        signature: header_string(&headers, "x-signature"),
    };
    // For error responses before the pipeline echoes one back.
    let correlation_id = trigger_headers
        .correlation_id
        .clone()
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    match state.dispatcher.trigger(&agent_key, &trigger_headers, &body).await {
        Ok(outcome) => success_response(outcome, started),
        Err(err) => {
            let mut response = AppError::from_trigger(err, &correlation_id).into_response();
            apply_cost_headers(&mut response, 0, None, started);
            response
        }
    }
}

fn success_response(outcome: TriggerOutcome, started: Instant) -> Response {
    let http_status = match outcome.disposition {
        Disposition::Admitted => StatusCode::ACCEPTED,
        Disposition::Duplicate | Disposition::BudgetStopped | Disposition::DryRun => StatusCode::OK,
    };

    let mut body = json!({
        "status": outcome.status,
        "run_id": outcome.run_id,
    });
    if let Some(preview) = outcome.preview {
        body["preview"] = json!(preview);
    }

    let mut response = (
        http_status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response();

    apply_cost_headers(
        &mut response,
        outcome.est_cost_cents,
        Some(outcome.budget_pct),
        started,
    );
    if let Ok(value) = HeaderValue::from_str(&outcome.correlation_id) {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}

/// `X-Est-Cost-EUR` and `X-Latency-ms` are present on every trigger
/// response, including errors; `X-Budget-Pct` only where a decision exists.
fn apply_cost_headers(
    response: &mut Response,
    est_cost_cents: u64,
    budget_pct: Option<f64>,
    started: Instant,
) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&format_eur(est_cost_cents)) {
        headers.insert("x-est-cost-eur", value);
    }
    if let Some(pct) = budget_pct {
        if let Ok(value) = HeaderValue::from_str(&format!("{pct:.1}")) {
            headers.insert("x-budget-pct", value);
        }
    }
    let latency = started.elapsed().as_millis() as u64;
    if let Ok(value) = HeaderValue::from_str(&latency.to_string()) {
        headers.insert("x-latency-ms", value);
    }
}
