//! Run polling handlers.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use agentry_types::run::Run;

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /v1/runs/{run_id} - Poll one run's status.
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let correlation_id = Uuid::now_v7().to_string();
    let run = state
        .registry
        .get(&run_id)
        .await
        .map_err(|e| AppError::internal(e.to_string(), &correlation_id))?
        .ok_or_else(|| AppError::not_found(format!("run not found: {run_id}"), &correlation_id))?;

    Ok(Json(run_json(&run)))
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub tenant_id: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /v1/runs?tenant_id=...&limit=... - Recent runs for a tenant.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Value>, AppError> {
    let correlation_id = Uuid::now_v7().to_string();
    let runs = state
        .registry
        .list_recent(&query.tenant_id, query.limit.clamp(1, 200))
        .await
        .map_err(|e| AppError::internal(e.to_string(), &correlation_id))?;

    Ok(Json(json!({
        "runs": runs.iter().map(run_json).collect::<Vec<_>>(),
        "count": runs.len(),
    })))
}

fn run_json(run: &Run) -> Value {
    json!({
        "run_id": run.run_id,
        "tenant_id": run.tenant_id,
        "department_key": run.department_key,
        "agent_key": run.agent_key,
        "correlation_id": run.correlation_id,
        "status": run.status,
        "progress": run.progress,
        "summary": run.summary,
        "error": run.error,
        "preview": run.preview,
        "estimated_cost_eur": run.estimated_cost_cents as f64 / 100.0,
        "created_at": run.created_at.to_rfc3339(),
        "updated_at": run.updated_at.to_rfc3339(),
    })
}
