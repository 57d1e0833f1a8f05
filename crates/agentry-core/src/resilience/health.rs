//! Rolling per-agent health statistics.
//!
//! Samples come from run outcomes: a completion webhook records a success
//! with the run's duration and reserved cost; dispatch failures and failure
//! webhooks record failures. The report is a read-only view for operators,
//! never consulted on the request path.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone)]
struct ExecutionSample {
    at: Instant,
    ok: bool,
    duration_ms: u64,
    cost_cents: u64,
}

/// Aggregated health view for one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentHealthReport {
    pub agent_key: String,
    /// Fraction of sampled executions that succeeded (1.0 with no samples).
    pub success_rate: f64,
    pub error_rate: f64,
    pub avg_execution_time_ms: f64,
    pub avg_cost_eur: f64,
    pub circuit_state: String,
    pub sample_count: usize,
    pub last_checked: DateTime<Utc>,
}

/// Bounded rolling window of execution outcomes per agent key.
pub struct HealthTracker {
    window: Duration,
    max_samples: usize,
    samples: DashMap<String, VecDeque<ExecutionSample>>,
}

impl HealthTracker {
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            window,
            max_samples,
            samples: DashMap::new(),
        }
    }

    pub fn record_success(&self, agent_key: &str, duration_ms: u64, cost_cents: u64) {
        self.push(
            agent_key,
            ExecutionSample {
                at: Instant::now(),
                ok: true,
                duration_ms,
                cost_cents,
            },
        );
    }

    pub fn record_failure(&self, agent_key: &str, duration_ms: u64) {
        self.push(
            agent_key,
            ExecutionSample {
                at: Instant::now(),
                ok: false,
                duration_ms,
                cost_cents: 0,
            },
        );
    }

    /// Build the health report for one agent. `circuit_state` comes from
    /// the breaker registry, which owns that state.
    pub fn report(&self, agent_key: &str, circuit_state: &str) -> AgentHealthReport {
        let mut successes = 0usize;
        let mut total = 0usize;
        let mut duration_sum = 0u64;
        let mut cost_sum = 0u64;

        if let Some(mut queue) = self.samples.get_mut(agent_key) {
            Self::prune(&mut queue, self.window);
            for sample in queue.iter() {
                total += 1;
                duration_sum += sample.duration_ms;
                if sample.ok {
                    successes += 1;
                    cost_sum += sample.cost_cents;
                }
            }
        }

        let success_rate = if total == 0 {
            1.0
        } else {
            successes as f64 / total as f64
        };
        let avg_execution_time_ms = if total == 0 {
            0.0
        } else {
            duration_sum as f64 / total as f64
        };
        let avg_cost_eur = if successes == 0 {
            0.0
        } else {
            cost_sum as f64 / successes as f64 / 100.0
        };

        AgentHealthReport {
            agent_key: agent_key.to_string(),
            success_rate,
            error_rate: 1.0 - success_rate,
            avg_execution_time_ms,
            avg_cost_eur,
            circuit_state: circuit_state.to_string(),
            sample_count: total,
            last_checked: Utc::now(),
        }
    }

    fn push(&self, agent_key: &str, sample: ExecutionSample) {
        let mut queue = self.samples.entry(agent_key.to_string()).or_default();
        queue.push_back(sample);
        Self::prune(&mut queue, self.window);
        while queue.len() > self.max_samples {
            queue.pop_front();
        }
    }

    fn prune(queue: &mut VecDeque<ExecutionSample>, window: Duration) {
        while let Some(front) = queue.front() {
            if front.at.elapsed() > window {
                queue.pop_front();
            } else {
                break;
            }
        }
    }
}
