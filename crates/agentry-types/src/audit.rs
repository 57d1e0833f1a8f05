//! Append-only audit record types.
//!
//! Every admission decision and state transition produces an audit entry,
//! including events that change nothing (duplicates, terminal-state echoes,
//! progress anomalies).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// A trigger was admitted and a run dispatched.
    TriggerAdmitted,
    /// A duplicate trigger replayed the recorded outcome.
    TriggerDuplicate,
    /// A trigger was accepted but held back by the budget guard.
    BudgetStop,
    /// A dry-run trigger was validated without dispatch.
    DryRun,
    /// A state transition was applied to a run.
    TransitionApplied,
    /// A duplicate webhook event was acknowledged without effect.
    EventDuplicate,
    /// An event against a terminal run was acknowledged without effect.
    EventIgnored,
    /// An event reported regressing progress and was ignored.
    ProgressAnomaly,
    /// Outbound dispatch failed terminally.
    DispatchFailed,
    /// Dispatch was rejected locally by an open circuit breaker.
    CircuitOpen,
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditKind::TriggerAdmitted => "trigger_admitted",
            AuditKind::TriggerDuplicate => "trigger_duplicate",
            AuditKind::BudgetStop => "budget_stop",
            AuditKind::DryRun => "dry_run",
            AuditKind::TransitionApplied => "transition_applied",
            AuditKind::EventDuplicate => "event_duplicate",
            AuditKind::EventIgnored => "event_ignored",
            AuditKind::ProgressAnomaly => "progress_anomaly",
            AuditKind::DispatchFailed => "dispatch_failed",
            AuditKind::CircuitOpen => "circuit_open",
        };
        f.write_str(s)
    }
}

impl FromStr for AuditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trigger_admitted" => Ok(AuditKind::TriggerAdmitted),
            "trigger_duplicate" => Ok(AuditKind::TriggerDuplicate),
            "budget_stop" => Ok(AuditKind::BudgetStop),
            "dry_run" => Ok(AuditKind::DryRun),
            "transition_applied" => Ok(AuditKind::TransitionApplied),
            "event_duplicate" => Ok(AuditKind::EventDuplicate),
            "event_ignored" => Ok(AuditKind::EventIgnored),
            "progress_anomaly" => Ok(AuditKind::ProgressAnomaly),
            "dispatch_failed" => Ok(AuditKind::DispatchFailed),
            "circuit_open" => Ok(AuditKind::CircuitOpen),
            other => Err(format!("unknown audit kind: '{other}'")),
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub run_id: Uuid,
    pub correlation_id: String,
    pub kind: AuditKind,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        run_id: Uuid,
        correlation_id: impl Into<String>,
        kind: AuditKind,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            run_id,
            correlation_id: correlation_id.into(),
            kind,
            detail,
            created_at: Utc::now(),
        }
    }
}
