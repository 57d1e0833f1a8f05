//! Run domain types and the run state machine.
//!
//! A `Run` is the unit of dispatched work. It is created by the trigger
//! dispatcher and afterwards mutated only through state transitions applied
//! by the webhook ingestor (or by the resilience layer marking a dispatch
//! failure). Terminal states are final; runs are never deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Admitted (or budget-stopped / dry-run) but not yet picked up.
    Queued,
    /// The executor reported progress.
    Running,
    /// Awaiting human-in-the-loop intervention.
    Hitl,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

impl RunStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// The allowed transition table.
    ///
    /// `queued -> {running, completed, failed}` (an executor may finish fast
    /// or fail at dispatch), `running -> {hitl, completed, failed}`,
    /// `hitl -> {running, completed, failed}`. Terminal states go nowhere.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match self {
            RunStatus::Queued => matches!(
                next,
                RunStatus::Running | RunStatus::Completed | RunStatus::Failed
            ),
            RunStatus::Running => matches!(
                next,
                RunStatus::Hitl | RunStatus::Completed | RunStatus::Failed
            ),
            RunStatus::Hitl => matches!(
                next,
                RunStatus::Running | RunStatus::Completed | RunStatus::Failed
            ),
            RunStatus::Completed | RunStatus::Failed => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Hitl => "hitl",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "hitl" => Ok(RunStatus::Hitl),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: '{other}'")),
        }
    }
}

/// Marker attached to runs that were accepted but not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPreview {
    /// Accepted at the HTTP layer but held back by the budget guard.
    BudgetStop,
    /// Validated end to end without dispatching.
    DryRun,
}

impl fmt::Display for RunPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPreview::BudgetStop => "BUDGET_STOP",
            RunPreview::DryRun => "DRY_RUN",
        };
        f.write_str(s)
    }
}

impl FromStr for RunPreview {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUDGET_STOP" => Ok(RunPreview::BudgetStop),
            "DRY_RUN" => Ok(RunPreview::DryRun),
            other => Err(format!("unknown run preview: '{other}'")),
        }
    }
}

/// The unit of dispatched work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Generated by the orchestrator at admission (UUIDv7, time-sortable).
    pub run_id: Uuid,
    /// Tenant/organization the run belongs to.
    pub tenant_id: String,
    /// Department charged for the run.
    pub department_key: String,
    /// Catalog key of the dispatched agent.
    pub agent_key: String,
    /// Correlation id propagated from the trigger request.
    pub correlation_id: String,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// 0..=100, monotonically non-decreasing.
    pub progress: u8,
    /// Final summary (mutually exclusive with `error`).
    pub summary: Option<String>,
    /// Failure reason (mutually exclusive with `summary`).
    pub error: Option<String>,
    /// Present on budget-stopped and dry-run runs.
    pub preview: Option<RunPreview>,
    /// Estimated cost reserved at admission (0 when budget-stopped).
    pub estimated_cost_cents: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Create a fresh run in `queued` state.
    pub fn new(
        tenant_id: impl Into<String>,
        department_key: impl Into<String>,
        agent_key: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::now_v7(),
            tenant_id: tenant_id.into(),
            department_key: department_key.into(),
            agent_key: agent_key.into(),
            correlation_id: correlation_id.into(),
            status: RunStatus::Queued,
            progress: 0,
            summary: None,
            error: None,
            preview: None,
            estimated_cost_cents: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Same as [`Run::new`] but tagged with a preview marker.
    pub fn with_preview(mut self, preview: RunPreview) -> Self {
        self.preview = Some(preview);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Hitl.is_terminal());
    }

    #[test]
    fn test_transition_table() {
        use RunStatus::*;

        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Completed));
        assert!(Queued.can_transition_to(Failed));
        assert!(!Queued.can_transition_to(Hitl));

        assert!(Running.can_transition_to(Hitl));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        // Human resumes or terminates
        assert!(Hitl.can_transition_to(Running));
        assert!(Hitl.can_transition_to(Completed));
        assert!(Hitl.can_transition_to(Failed));

        // Nothing leaves a terminal state
        for next in [Queued, Running, Hitl, Completed, Failed] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Hitl,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            let parsed: RunStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("cancelled".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_preview_wire_format() {
        assert_eq!(RunPreview::BudgetStop.to_string(), "BUDGET_STOP");
        assert_eq!(RunPreview::DryRun.to_string(), "DRY_RUN");
        assert_eq!(
            serde_json::to_string(&RunPreview::BudgetStop).unwrap(),
            "\"BUDGET_STOP\""
        );
        assert_eq!("DRY_RUN".parse::<RunPreview>().unwrap(), RunPreview::DryRun);
    }

    #[test]
    fn test_new_run_defaults() {
        let run = Run::new("org-1", "sales", "sales_followup", "corr-1");
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.progress, 0);
        assert!(run.summary.is_none());
        assert!(run.error.is_none());
        assert!(run.preview.is_none());
    }

    #[test]
    fn test_with_preview() {
        let run =
            Run::new("org-1", "sales", "sales_followup", "corr-1").with_preview(RunPreview::BudgetStop);
        assert_eq!(run.preview, Some(RunPreview::BudgetStop));
        assert_eq!(run.status, RunStatus::Queued);
    }
}
