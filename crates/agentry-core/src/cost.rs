//! Deterministic cost estimation for agent runs.
//!
//! The estimate is a pure function of agent metadata and payload size, so it
//! is independently testable and swappable without touching the dispatcher.
//! It is NOT a live LLM estimate: `cents = base_rate x budget_weight x
//! size_factor`, where the size factor grows linearly with the serialized
//! payload and saturates at [`MAX_SIZE_FACTOR`].

use agentry_types::agent::AgentDefinition;

/// Payload bytes per unit of size-factor growth.
const SIZE_FACTOR_DIVISOR: f64 = 4096.0;

/// Ceiling on the size factor (reached at 8 KiB of payload).
const MAX_SIZE_FACTOR: f64 = 3.0;

/// Estimate the cost of one run in euro cents.
pub fn estimate_cost_cents(def: &AgentDefinition, base_rate_cents: u64, payload_len: usize) -> u64 {
    let size_factor = (1.0 + payload_len as f64 / SIZE_FACTOR_DIVISOR).min(MAX_SIZE_FACTOR);
    (base_rate_cents as f64 * def.budget_weight * size_factor).round() as u64
}

/// Format cents as a EUR amount with two decimals, for the
/// `X-Est-Cost-EUR` header.
pub fn format_eur(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}
