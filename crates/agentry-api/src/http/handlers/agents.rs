//! Agent catalog and health handlers.

use axum::extract::{Path, State};
use axum::response::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /v1/agents - The loaded agent catalog.
pub async fn list_agents(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "agents": state.catalog.agents(),
        "count": state.catalog.len(),
        "departments": state.catalog.departments(),
    }))
}

/// GET /v1/agents/{agent_key}/health - Rolling health view for one agent.
pub async fn agent_health(
    State(state): State<AppState>,
    Path(agent_key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let correlation_id = Uuid::now_v7().to_string();
    if state.catalog.get(&agent_key).is_none() {
        return Err(AppError::not_found(
            format!("unknown agent: '{agent_key}'"),
            &correlation_id,
        ));
    }

    let circuit_state = state.connectors.circuit_state(&agent_key);
    let report = state.health.report(&agent_key, circuit_state);
    Ok(Json(serde_json::to_value(report).unwrap_or_else(|_| json!({}))))
}

/// POST /v1/agents/{agent_key}/reset - Operator reset of the circuit breaker.
pub async fn reset_agent(
    State(state): State<AppState>,
    Path(agent_key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let correlation_id = Uuid::now_v7().to_string();
    if state.catalog.get(&agent_key).is_none() {
        return Err(AppError::not_found(
            format!("unknown agent: '{agent_key}'"),
            &correlation_id,
        ));
    }

    state.connectors.reset_breaker(&agent_key);
    Ok(Json(json!({
        "agent_key": agent_key,
        "circuit_state": state.connectors.circuit_state(&agent_key),
        "reset": true,
    })))
}
