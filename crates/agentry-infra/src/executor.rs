//! HTTP executor client.
//!
//! POSTs admitted work to the external agent executor service. Error
//! mapping follows the dispatch taxonomy: connection problems become
//! `Transport` (retryable), HTTP status >= 500 becomes a retryable
//! `Executor` error, anything else 4xx is non-retryable. The resilience
//! layer owns the attempt timeout, so no client-level timeout is set here.

use serde::Deserialize;

use agentry_core::executor::{DispatchRequest, ExecutorAck, ExecutorClient};
use agentry_types::error::DispatchError;

/// Cap on error-body text carried into logs and run records.
const MAX_ERROR_BODY: usize = 512;

/// reqwest-based client for the agent executor service.
pub struct HttpExecutorClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AckBody {
    #[serde(rename = "executionRef")]
    execution_ref: Option<String>,
}

impl HttpExecutorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn executions_url(&self) -> String {
        format!("{}/v1/executions", self.base_url.trim_end_matches('/'))
    }
}

impl ExecutorClient for HttpExecutorClient {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<ExecutorAck, DispatchError> {
        let body = serde_json::json!({
            "runId": request.run_id,
            "agentKey": request.agent_key,
            "tenantId": request.tenant_id,
            "payload": request.payload,
        });

        let response = self
            .client
            .post(self.executions_url())
            .header("X-Correlation-Id", &request.correlation_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let ack: Option<AckBody> = response.json().await.ok();
            return Ok(ExecutorAck {
                accepted_at: chrono::Utc::now(),
                executor_ref: ack.and_then(|a| a.execution_ref),
            });
        }

        let message = truncate(&response.text().await.unwrap_or_default());
        Err(DispatchError::Executor {
            status: status.as_u16(),
            message,
        })
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_ERROR_BODY {
        text.to_string()
    } else {
        let mut end = MAX_ERROR_BODY;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
