//! Outbound executor client seam.
//!
//! The orchestrator hands admitted work to an external agent executor over
//! HTTP. The reqwest implementation lives in agentry-infra; the resilience
//! layer wraps this trait with circuit breaking, retry, and timeouts.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use agentry_types::error::DispatchError;

/// One outbound dispatch to an agent executor.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub run_id: Uuid,
    pub agent_key: String,
    pub tenant_id: String,
    pub correlation_id: String,
    pub payload: serde_json::Value,
    /// Estimate reserved at admission; recorded in health samples.
    pub estimated_cost_cents: u64,
}

/// Acknowledgement from the executor that it accepted the work.
///
/// Progress and completion arrive later as signed webhook events.
#[derive(Debug, Clone)]
pub struct ExecutorAck {
    pub accepted_at: DateTime<Utc>,
    /// Executor-side reference for the run, when provided.
    pub executor_ref: Option<String>,
}

/// Client for the external agent executor.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ExecutorClient: Send + Sync {
    fn dispatch(
        &self,
        request: &DispatchRequest,
    ) -> impl std::future::Future<Output = Result<ExecutorAck, DispatchError>> + Send;
}
