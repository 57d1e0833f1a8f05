//! Per-agent circuit breaker with consecutive-failure and windowed
//! failure-rate tripping.
//!
//! State machine: Closed -> Open (threshold or rate trip) -> HalfOpen (after
//! the recovery timeout) -> Closed (probe success) or back to Open (probe
//! failure). Half-open admits exactly one trial dispatch; concurrent callers
//! are rejected while the probe is in flight.

use std::time::Instant;

use dashmap::DashMap;

use agentry_types::config::BreakerConfig;

/// What the breaker allows for a new dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// Circuit closed, attempt proceeds normally.
    Allow,
    /// Circuit half-open, this attempt is the single recovery probe.
    AllowProbe,
    /// Circuit open, attempt must not start.
    Reject,
}

#[derive(Debug, Clone, Copy)]
enum CircuitState {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { probe_in_flight: bool },
}

#[derive(Debug)]
struct BreakerEntry {
    state: CircuitState,
    window_start: Instant,
    window_failures: u32,
    window_total: u32,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed {
                consecutive_failures: 0,
            },
            window_start: Instant::now(),
            window_failures: 0,
            window_total: 0,
        }
    }
}

/// Breaker state for every agent key, consulted before each dispatch.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    entries: DashMap<String, BreakerEntry>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Gate a new dispatch attempt for `agent_key`.
    pub fn try_acquire(&self, agent_key: &str) -> BreakerDecision {
        let mut guard = self
            .entries
            .entry(agent_key.to_string())
            .or_insert_with(BreakerEntry::new);
        let entry = &mut *guard;

        match entry.state {
            CircuitState::Closed { .. } => BreakerDecision::Allow,
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() >= self.config.recovery_timeout() {
                    tracing::info!(agent_key, "circuit half-open, admitting recovery probe");
                    entry.state = CircuitState::HalfOpen {
                        probe_in_flight: true,
                    };
                    BreakerDecision::AllowProbe
                } else {
                    BreakerDecision::Reject
                }
            }
            CircuitState::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    BreakerDecision::Reject
                } else {
                    entry.state = CircuitState::HalfOpen {
                        probe_in_flight: true,
                    };
                    BreakerDecision::AllowProbe
                }
            }
        }
    }

    /// Record a successful attempt outcome.
    pub fn record_success(&self, agent_key: &str) {
        let mut guard = self
            .entries
            .entry(agent_key.to_string())
            .or_insert_with(BreakerEntry::new);
        let entry = &mut *guard;

        self.roll_window(entry);
        entry.window_total += 1;

        let was_half_open = matches!(entry.state, CircuitState::HalfOpen { .. });
        entry.state = CircuitState::Closed {
            consecutive_failures: 0,
        };
        if was_half_open {
            tracing::info!(agent_key, "recovery probe succeeded, closing circuit");
            entry.window_start = Instant::now();
            entry.window_failures = 0;
            entry.window_total = 0;
        }
    }

    /// Record a failed attempt outcome.
    pub fn record_failure(&self, agent_key: &str) {
        let mut guard = self
            .entries
            .entry(agent_key.to_string())
            .or_insert_with(BreakerEntry::new);
        let entry = &mut *guard;

        self.roll_window(entry);
        entry.window_total += 1;
        entry.window_failures += 1;

        match entry.state {
            CircuitState::Closed {
                consecutive_failures,
            } => {
                let streak = consecutive_failures + 1;
                let rate_tripped = entry.window_total >= self.config.min_samples
                    && entry.window_failures as f64 / entry.window_total as f64
                        >= self.config.failure_rate_threshold;

                if streak >= self.config.failure_threshold || rate_tripped {
                    tracing::warn!(
                        agent_key,
                        consecutive_failures = streak,
                        window_failures = entry.window_failures,
                        window_total = entry.window_total,
                        "circuit opened"
                    );
                    entry.state = CircuitState::Open {
                        opened_at: Instant::now(),
                    };
                } else {
                    entry.state = CircuitState::Closed {
                        consecutive_failures: streak,
                    };
                }
            }
            CircuitState::HalfOpen { .. } => {
                tracing::warn!(agent_key, "recovery probe failed, reopening circuit");
                entry.state = CircuitState::Open {
                    opened_at: Instant::now(),
                };
            }
            CircuitState::Open { .. } => {}
        }
    }

    /// Circuit state label for health reporting.
    pub fn state_label(&self, agent_key: &str) -> &'static str {
        match self.entries.get(agent_key) {
            Some(entry) => match entry.state {
                CircuitState::Closed { .. } => "closed",
                CircuitState::Open { .. } => "open",
                CircuitState::HalfOpen { .. } => "half_open",
            },
            None => "closed",
        }
    }

    /// Operator reset: back to closed with fresh counters.
    pub fn reset(&self, agent_key: &str) {
        self.entries.insert(agent_key.to_string(), BreakerEntry::new());
        tracing::info!(agent_key, "circuit breaker reset");
    }

    fn roll_window(&self, entry: &mut BreakerEntry) {
        if entry.window_start.elapsed() >= self.config.window() {
            entry.window_start = Instant::now();
            entry.window_failures = 0;
            entry.window_total = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            failure_rate_threshold: 0.5,
            min_samples: 10,
            recovery_timeout_ms: 3_600_000,
            window_ms: 3_600_000,
        }
    }

    #[test]
    fn test_starts_closed() {
        let breakers = CircuitBreakerRegistry::new(config());
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::Allow);
        assert_eq!(breakers.state_label("a"), "closed");
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let breakers = CircuitBreakerRegistry::new(config());
        breakers.record_failure("a");
        breakers.record_failure("a");
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::Allow);

        breakers.record_failure("a");
        assert_eq!(breakers.state_label("a"), "open");
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::Reject);
    }

    #[test]
    fn test_success_resets_streak() {
        let breakers = CircuitBreakerRegistry::new(config());
        breakers.record_failure("a");
        breakers.record_failure("a");
        breakers.record_success("a");
        breakers.record_failure("a");
        breakers.record_failure("a");
        // Streak was broken; still closed
        assert_eq!(breakers.state_label("a"), "closed");
    }

    #[test]
    fn test_failure_rate_trips_with_min_samples() {
        let mut cfg = config();
        cfg.failure_threshold = 100; // only the rate can trip
        let breakers = CircuitBreakerRegistry::new(cfg);

        // 5 failures / 9 samples: rate is over 0.5 but below min_samples
        for _ in 0..4 {
            breakers.record_success("a");
        }
        for _ in 0..5 {
            breakers.record_failure("a");
        }
        assert_eq!(breakers.state_label("a"), "closed");

        // Tenth sample reaches min_samples with 6/10 failures
        breakers.record_failure("a");
        assert_eq!(breakers.state_label("a"), "open");
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let mut cfg = config();
        cfg.recovery_timeout_ms = 0;
        let breakers = CircuitBreakerRegistry::new(cfg);

        for _ in 0..3 {
            breakers.record_failure("a");
        }
        // Zero recovery timeout: next acquire is the probe
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::AllowProbe);
        assert_eq!(breakers.state_label("a"), "half_open");
    }

    #[test]
    fn test_half_open_admits_exactly_one_probe() {
        let mut cfg = config();
        cfg.recovery_timeout_ms = 0;
        let breakers = CircuitBreakerRegistry::new(cfg);

        for _ in 0..3 {
            breakers.record_failure("a");
        }
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::AllowProbe);
        // Probe in flight: everyone else is rejected
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::Reject);
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::Reject);
    }

    #[test]
    fn test_probe_success_closes_with_reset_counters() {
        let mut cfg = config();
        cfg.recovery_timeout_ms = 0;
        let breakers = CircuitBreakerRegistry::new(cfg);

        for _ in 0..3 {
            breakers.record_failure("a");
        }
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::AllowProbe);
        breakers.record_success("a");

        assert_eq!(breakers.state_label("a"), "closed");
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::Allow);

        // Counters were reset: two fresh failures do not reopen
        breakers.record_failure("a");
        breakers.record_failure("a");
        assert_eq!(breakers.state_label("a"), "closed");
    }

    #[test]
    fn test_probe_failure_reopens() {
        let mut cfg = config();
        cfg.recovery_timeout_ms = 0;
        let breakers = CircuitBreakerRegistry::new(cfg);

        for _ in 0..3 {
            breakers.record_failure("a");
        }
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::AllowProbe);
        breakers.record_failure("a");
        assert_eq!(breakers.state_label("a"), "open");
        // Zero recovery timeout re-admits a probe immediately
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::AllowProbe);
    }

    #[test]
    fn test_agents_are_independent() {
        let breakers = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            breakers.record_failure("degraded");
        }
        assert_eq!(breakers.try_acquire("degraded"), BreakerDecision::Reject);
        assert_eq!(breakers.try_acquire("healthy"), BreakerDecision::Allow);
    }

    #[test]
    fn test_operator_reset() {
        let breakers = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            breakers.record_failure("a");
        }
        assert_eq!(breakers.state_label("a"), "open");
        breakers.reset("a");
        assert_eq!(breakers.state_label("a"), "closed");
        assert_eq!(breakers.try_acquire("a"), BreakerDecision::Allow);
    }
}
