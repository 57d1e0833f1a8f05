//! Agent catalog types.
//!
//! The catalog is an immutable list of agent definitions loaded once at boot
//! from `agents.toml` and validated eagerly -- the process fails fast on an
//! invalid catalog. It is never mutated at request time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Lower bound for `budget_weight`.
pub const MIN_BUDGET_WEIGHT: f64 = 0.1;
/// Upper bound for `budget_weight`.
pub const MAX_BUDGET_WEIGHT: f64 = 3.0;

/// The kind of executor behind an agent key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// A single automation scenario.
    Agent,
    /// A department-level director that fans out to other agents.
    Director,
}

/// Immutable catalog entry describing one dispatchable agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique key, used in trigger URLs and as the circuit breaker scope.
    pub agent_key: String,
    /// Department owning this agent; budget accounting is per department.
    pub department_key: String,
    /// Agent or director.
    pub kind: AgentKind,
    /// Whether runs of this agent require human-in-the-loop approval.
    #[serde(default)]
    pub hitl: bool,
    /// Service-level objective for run completion.
    pub sla_minutes: u32,
    /// Multiplier on the estimated cost, 0.1..=3.0.
    pub budget_weight: f64,
}

/// The full agent catalog.
///
/// Construct with [`AgentCatalog::new`], which validates; a catalog obtained
/// that way is known-good for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCatalog {
    #[serde(default)]
    agents: Vec<AgentDefinition>,
}

impl AgentCatalog {
    /// Build a validated catalog from a list of definitions.
    pub fn new(agents: Vec<AgentDefinition>) -> Result<Self, CatalogError> {
        let catalog = Self { agents };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Validate every entry. Duplicate keys, empty keys or departments,
    /// out-of-range budget weights, and zero SLAs are all fatal.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.agents.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen: HashMap<&str, ()> = HashMap::with_capacity(self.agents.len());
        for def in &self.agents {
            if def.agent_key.is_empty() {
                return Err(CatalogError::EmptyKey);
            }
            if seen.insert(def.agent_key.as_str(), ()).is_some() {
                return Err(CatalogError::DuplicateKey(def.agent_key.clone()));
            }
            if def.department_key.is_empty() {
                return Err(CatalogError::EmptyDepartment(def.agent_key.clone()));
            }
            if !(MIN_BUDGET_WEIGHT..=MAX_BUDGET_WEIGHT).contains(&def.budget_weight) {
                return Err(CatalogError::BudgetWeightOutOfRange {
                    agent: def.agent_key.clone(),
                    weight: def.budget_weight,
                    min: MIN_BUDGET_WEIGHT,
                    max: MAX_BUDGET_WEIGHT,
                });
            }
            if def.sla_minutes == 0 {
                return Err(CatalogError::ZeroSla(def.agent_key.clone()));
            }
        }

        Ok(())
    }

    /// Look up an agent by key.
    pub fn get(&self, agent_key: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.agent_key == agent_key)
    }

    /// All definitions, in catalog order.
    pub fn agents(&self) -> &[AgentDefinition] {
        &self.agents
    }

    /// Number of catalog entries.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the catalog is empty (only possible before validation).
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Distinct department keys, in first-seen order.
    pub fn departments(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for def in &self.agents {
            if !out.contains(&def.department_key.as_str()) {
                out.push(&def.department_key);
            }
        }
        out
    }
}
