//! Executor callback event types.
//!
//! Agent executors report progress and completion by POSTing signed events
//! to `/agents/events`. Status values are SCREAMING_SNAKE_CASE on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::run::RunStatus;

/// Status reported by an executor callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Running,
    Hitl,
    Failed,
    Completed,
}

impl EventStatus {
    /// The run status this event drives the state machine toward.
    pub fn as_run_status(self) -> RunStatus {
        match self {
            EventStatus::Running => RunStatus::Running,
            EventStatus::Hitl => RunStatus::Hitl,
            EventStatus::Failed => RunStatus::Failed,
            EventStatus::Completed => RunStatus::Completed,
        }
    }
}

/// An executor callback event, as received on the webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorEvent {
    pub run_id: Uuid,
    pub status: EventStatus,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutorEvent {
    /// Semantic validation beyond what serde enforces. Returns the first
    /// violation as a message.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(p) = self.progress {
            if p > 100 {
                return Err(format!("progress {p} exceeds 100"));
            }
        }
        if self.summary.is_some() && self.error.is_some() {
            return Err("summary and error are mutually exclusive".to_string());
        }
        if self.status == EventStatus::Failed && self.summary.is_some() {
            return Err("failed events carry error, not summary".to_string());
        }
        Ok(())
    }
}
