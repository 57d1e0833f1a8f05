//! Per-connector resilience: circuit breaker, retry/backoff, health.
//!
//! [`ConnectorPool`] wraps every outbound dispatch to an agent executor.
//! Before each attempt the agent's circuit breaker is consulted; each
//! attempt outcome feeds the breaker's counters; retryable failures are
//! re-attempted with exponential backoff while the breaker still admits
//! attempts.

pub mod breaker;
pub mod health;
pub mod retry;

use std::time::Duration;

use tokio::time::Instant;

use agentry_types::config::{BreakerConfig, RetryConfig};
use agentry_types::error::DispatchError;

use crate::executor::{DispatchRequest, ExecutorAck, ExecutorClient};

pub use breaker::{BreakerDecision, CircuitBreakerRegistry};
pub use health::{AgentHealthReport, HealthTracker};
pub use retry::RetryPolicy;

/// Resilient front for an executor client.
pub struct ConnectorPool<E: ExecutorClient> {
    pub(crate) client: E,
    breakers: CircuitBreakerRegistry,
    health: std::sync::Arc<HealthTracker>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<E: ExecutorClient> ConnectorPool<E> {
    pub fn new(
        client: E,
        breaker_config: BreakerConfig,
        retry_config: RetryConfig,
        timeout: Duration,
        health: std::sync::Arc<HealthTracker>,
    ) -> Self {
        Self {
            client,
            breakers: CircuitBreakerRegistry::new(breaker_config),
            health,
            retry: RetryPolicy::new(retry_config),
            timeout,
        }
    }

    /// Dispatch one run to the executor, applying the full resilience
    /// policy. Returns the executor's acknowledgement or the terminal
    /// dispatch error.
    ///
    /// An attempt already in flight when the breaker opens is allowed to
    /// finish and its outcome is still recorded; the breaker only gates the
    /// START of attempts.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<ExecutorAck, DispatchError> {
        let mut attempt: u32 = 0;
        loop {
            if self.breakers.try_acquire(&request.agent_key) == BreakerDecision::Reject {
                tracing::warn!(
                    run_id = %request.run_id,
                    agent_key = %request.agent_key,
                    attempt,
                    "dispatch rejected locally, circuit open"
                );
                return Err(DispatchError::CircuitOpen(request.agent_key.clone()));
            }

            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.timeout, self.client.dispatch(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Timeout(self.timeout.as_millis() as u64)),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(ack) => {
                    self.breakers.record_success(&request.agent_key);
                    tracing::info!(
                        run_id = %request.run_id,
                        agent_key = %request.agent_key,
                        latency_ms,
                        attempt,
                        "dispatch accepted by executor"
                    );
                    return Ok(ack);
                }
                Err(err) => {
                    self.breakers.record_failure(&request.agent_key);
                    self.health.record_failure(&request.agent_key, latency_ms);

                    if self.retry.should_retry(attempt, &err) {
                        let delay = self.retry.delay_for(attempt);
                        tracing::warn!(
                            run_id = %request.run_id,
                            agent_key = %request.agent_key,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "dispatch attempt failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(if attempt > 0 {
                        DispatchError::Exhausted {
                            attempts: attempt + 1,
                            last: err.to_string(),
                        }
                    } else {
                        err
                    });
                }
            }
        }
    }

    /// Circuit state label for an agent, for the health view.
    pub fn circuit_state(&self, agent_key: &str) -> &'static str {
        self.breakers.state_label(agent_key)
    }

    /// Operator reset of an agent's breaker.
    pub fn reset_breaker(&self, agent_key: &str) {
        self.breakers.reset(agent_key);
    }
}
