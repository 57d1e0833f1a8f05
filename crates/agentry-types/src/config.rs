//! Orchestrator configuration types.
//!
//! `OrchestratorConfig` represents the top-level `agentry.toml`. Everything
//! except the two HMAC secrets has a default; secrets are wrapped in
//! `secrecy::SecretString` so they never appear in debug output or logs.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// Top-level configuration for the orchestrator.
#[derive(Debug, Deserialize)]
pub struct OrchestratorConfig {
    /// Shared secret for trigger request signatures.
    pub trigger_secret: SecretString,
    /// Shared secret for executor webhook signatures (distinct keyspace).
    pub webhook_secret: SecretString,

    #[serde(default)]
    pub signature: SignatureConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cost: CostConfig,

    /// Per-department monthly budgets. Departments not listed here are
    /// unmetered (always admitted, nothing tracked).
    #[serde(default)]
    pub budgets: Vec<DepartmentBudget>,
}

/// Replay-protection window for signed requests.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureConfig {
    /// Maximum allowed |now - timestamp| in seconds.
    #[serde(default = "default_max_skew")]
    pub max_skew_seconds: i64,
}

fn default_max_skew() -> i64 {
    300
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            max_skew_seconds: default_max_skew(),
        }
    }
}

/// TTLs for the idempotency store namespaces.
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyConfig {
    #[serde(default = "default_ttl_minutes")]
    pub trigger_ttl_minutes: i64,
    #[serde(default = "default_ttl_minutes")]
    pub event_ttl_minutes: i64,
}

fn default_ttl_minutes() -> i64 {
    15
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            trigger_ttl_minutes: default_ttl_minutes(),
            event_ttl_minutes: default_ttl_minutes(),
        }
    }
}

/// Outbound dispatch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Base URL of the agent executor service.
    #[serde(default = "default_executor_url")]
    pub executor_url: String,
    /// Bound on a single dispatch attempt.
    #[serde(default = "default_dispatch_timeout")]
    pub timeout_seconds: u64,
}

fn default_executor_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_dispatch_timeout() -> u64 {
    30
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            executor_url: default_executor_url(),
            timeout_seconds: default_dispatch_timeout(),
        }
    }
}

/// Circuit breaker tuning, applied per agent key.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Failure-rate threshold within the rolling window (0.0..=1.0).
    #[serde(default = "default_failure_rate")]
    pub failure_rate_threshold: f64,
    /// Minimum attempts in the window before the rate is considered.
    #[serde(default = "default_min_samples")]
    pub min_samples: u32,
    /// How long the circuit stays open before a half-open probe.
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
    /// Rolling window length for failure-rate tracking.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_failure_rate() -> f64 {
    0.5
}

fn default_min_samples() -> u32 {
    10
}

fn default_recovery_timeout_ms() -> u64 {
    30_000
}

fn default_window_ms() -> u64 {
    60_000
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_rate_threshold: default_failure_rate(),
            min_samples: default_min_samples(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            window_ms: default_window_ms(),
        }
    }
}

/// Retry/backoff tuning for outbound dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Cost estimation tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct CostConfig {
    /// Base rate in euro cents before weight/size scaling.
    #[serde(default = "default_base_rate_cents")]
    pub base_rate_cents: u64,
}

fn default_base_rate_cents() -> u64 {
    5
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            base_rate_cents: default_base_rate_cents(),
        }
    }
}

/// Monthly budget for one department, in EUR at the config boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct DepartmentBudget {
    pub department_key: String,
    pub monthly_budget_eur: f64,
}

impl DepartmentBudget {
    /// Budget in integer euro cents (internal representation).
    pub fn monthly_budget_cents(&self) -> u64 {
        (self.monthly_budget_eur * 100.0).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_minimal_toml() {
        let toml_str = r#"
trigger_secret = "trigger-secret"
webhook_secret = "webhook-secret"
"#;
        let config: OrchestratorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.signature.max_skew_seconds, 300);
        assert_eq!(config.idempotency.trigger_ttl_minutes, 15);
        assert_eq!(config.dispatch.timeout_seconds, 30);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.cost.base_rate_cents, 5);
        assert!(config.budgets.is_empty());
    }

    #[test]
    fn test_config_full_toml() {
        let toml_str = r#"
trigger_secret = "ts"
webhook_secret = "ws"

[signature]
max_skew_seconds = 120

[breaker]
failure_threshold = 3
recovery_timeout_ms = 5000

[retry]
max_retries = 2
initial_delay_ms = 250

[[budgets]]
department_key = "sales"
monthly_budget_eur = 100.0

[[budgets]]
department_key = "finance"
monthly_budget_eur = 250.5
"#;
        let config: OrchestratorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.signature.max_skew_seconds, 120);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.recovery_timeout(), Duration::from_secs(5));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.budgets.len(), 2);
        assert_eq!(config.budgets[0].monthly_budget_cents(), 10_000);
        assert_eq!(config.budgets[1].monthly_budget_cents(), 25_050);
    }

    #[test]
    fn test_missing_secrets_rejected() {
        let err = toml::from_str::<OrchestratorConfig>("").unwrap_err();
        assert!(err.to_string().contains("trigger_secret"));
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let config: OrchestratorConfig = toml::from_str(
            "trigger_secret = \"super-secret\"\nwebhook_secret = \"also-secret\"\n",
        )
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("also-secret"));
    }
}
