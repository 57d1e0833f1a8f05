//! Trigger request body.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /v1/agents/{agent_key}/trigger`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerBody {
    /// Client-generated request id (distinct from the idempotency key).
    pub request_id: Uuid,
    /// Tenant/organization identifier.
    pub org_id: String,
    /// Calling surface, e.g. "cockpit".
    pub actor: String,
    /// Opaque payload forwarded to the executor.
    pub payload: serde_json::Value,
    /// Validate and price without dispatching.
    #[serde(rename = "dryRun", default)]
    pub dry_run: bool,
}

impl TriggerBody {
    /// Semantic validation beyond serde. Returns the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.org_id.is_empty() {
            return Err("org_id must not be empty".to_string());
        }
        if self.actor.is_empty() {
            return Err("actor must not be empty".to_string());
        }
        Ok(())
    }

    /// Serialized payload size in bytes, used for cost estimation.
    pub fn payload_len(&self) -> usize {
        serde_json::to_vec(&self.payload).map(|v| v.len()).unwrap_or(0)
    }
}
