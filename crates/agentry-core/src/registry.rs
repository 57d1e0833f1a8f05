//! Run registry: the single owner of run state transitions.
//!
//! Runs are created by the trigger dispatcher and mutated only here. Each
//! transition is a conditional update keyed on the run's current status, so
//! a stale webhook can never clobber a newer state; on conflict the event
//! is re-evaluated against the fresh row. Everything -- applied transitions,
//! terminal-state echoes, invalid transitions, progress anomalies -- is
//! audited.

use uuid::Uuid;

use agentry_types::audit::{AuditEntry, AuditKind};
use agentry_types::error::{EventError, RepositoryError};
use agentry_types::event::{EventStatus, ExecutorEvent};
use agentry_types::run::{Run, RunStatus};

use crate::repository::{AuditSink, RunRepository, TransitionUpdate};

/// Bounded retries when a conditional update loses a race.
const MAX_CONFLICT_RETRIES: usize = 5;

/// What applying an event did.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// The transition landed.
    Applied(Run),
    /// The run is already terminal; acknowledged, audited, unchanged.
    Terminal(Run),
    /// The transition is not allowed from the current status; acknowledged,
    /// audited, unchanged.
    InvalidTransition(Run),
    /// The event reported regressing progress; acknowledged as an anomaly,
    /// unchanged.
    ProgressRegression(Run),
}

impl ApplyOutcome {
    /// The run as of this outcome.
    pub fn run(&self) -> &Run {
        match self {
            ApplyOutcome::Applied(run)
            | ApplyOutcome::Terminal(run)
            | ApplyOutcome::InvalidTransition(run)
            | ApplyOutcome::ProgressRegression(run) => run,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }
}

/// Durable state machine instances keyed by run id.
pub struct RunRegistry<R: RunRepository, A: AuditSink> {
    repo: R,
    audit: A,
}

impl<R: RunRepository, A: AuditSink> RunRegistry<R, A> {
    pub fn new(repo: R, audit: A) -> Self {
        Self { repo, audit }
    }

    /// Persist a freshly admitted run.
    pub async fn create(&self, run: &Run) -> Result<(), RepositoryError> {
        self.repo.create(run).await
    }

    pub async fn get(&self, run_id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        self.repo.get(run_id).await
    }

    pub async fn list_recent(&self, tenant_id: &str, limit: i64) -> Result<Vec<Run>, RepositoryError> {
        self.repo.list_recent(tenant_id, limit).await
    }

    /// Apply an executor event to the state machine.
    ///
    /// Serialized per run id via the repository's conditional update; on
    /// conflict the event is re-evaluated against the fresh row, bounded by
    /// [`MAX_CONFLICT_RETRIES`].
    pub async fn apply_event(
        &self,
        event: &ExecutorEvent,
        correlation_id: &str,
    ) -> Result<ApplyOutcome, EventError> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let run = self
                .repo
                .get(&event.run_id)
                .await?
                .ok_or(EventError::UnknownRun(event.run_id))?;

            let target = event.status.as_run_status();

            if run.status.is_terminal() {
                self.record_audit(AuditEntry::new(
                    run.run_id,
                    correlation_id,
                    AuditKind::EventIgnored,
                    Some(format!("run already {}, event {:?} dropped", run.status, event.status)),
                ))
                .await;
                return Ok(ApplyOutcome::Terminal(run));
            }

            let effective_progress = event.progress.unwrap_or(match event.status {
                EventStatus::Completed => 100,
                _ => run.progress,
            });

            if effective_progress < run.progress {
                tracing::warn!(
                    run_id = %run.run_id,
                    stored = run.progress,
                    reported = effective_progress,
                    "progress regression in webhook event, ignoring"
                );
                self.record_audit(AuditEntry::new(
                    run.run_id,
                    correlation_id,
                    AuditKind::ProgressAnomaly,
                    Some(format!("reported {} below stored {}", effective_progress, run.progress)),
                ))
                .await;
                return Ok(ApplyOutcome::ProgressRegression(run));
            }

            let same_status = run.status == target;
            if !same_status && !run.status.can_transition_to(target) {
                self.record_audit(AuditEntry::new(
                    run.run_id,
                    correlation_id,
                    AuditKind::EventIgnored,
                    Some(format!("transition {} -> {} not allowed", run.status, target)),
                ))
                .await;
                return Ok(ApplyOutcome::InvalidTransition(run));
            }

            let update = TransitionUpdate {
                new_status: target,
                progress: effective_progress,
                summary: event.summary.clone(),
                error: event.error.clone(),
            };

            if self.repo.apply_transition(&run.run_id, run.status, &update).await? {
                tracing::info!(
                    run_id = %run.run_id,
                    from = %run.status,
                    to = %target,
                    progress = effective_progress,
                    "run transition applied"
                );
                self.record_audit(AuditEntry::new(
                    run.run_id,
                    correlation_id,
                    AuditKind::TransitionApplied,
                    Some(format!("{} -> {} (progress {})", run.status, target, effective_progress)),
                ))
                .await;

                let mut updated = run;
                updated.status = target;
                updated.progress = effective_progress;
                if update.summary.is_some() {
                    updated.summary = update.summary;
                }
                if update.error.is_some() {
                    updated.error = update.error;
                }
                updated.updated_at = chrono::Utc::now();
                return Ok(ApplyOutcome::Applied(updated));
            }
            // Lost the race against a concurrent transition; re-read.
        }

        Err(EventError::Store(RepositoryError::Conflict(format!(
            "run {} transition contention exceeded {MAX_CONFLICT_RETRIES} retries",
            event.run_id
        ))))
    }

    /// Mark a run failed from the dispatch path (retry exhaustion or a
    /// circuit-open rejection). A run that already reached a terminal state
    /// is left untouched.
    pub async fn mark_failed(
        &self,
        run_id: &Uuid,
        reason: &str,
        kind: AuditKind,
        correlation_id: &str,
    ) -> Result<(), RepositoryError> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let Some(run) = self.repo.get(run_id).await? else {
                return Err(RepositoryError::NotFound);
            };
            if run.status.is_terminal() {
                return Ok(());
            }

            let update = TransitionUpdate {
                new_status: RunStatus::Failed,
                progress: run.progress,
                summary: None,
                error: Some(reason.to_string()),
            };
            if self.repo.apply_transition(run_id, run.status, &update).await? {
                tracing::warn!(run_id = %run_id, reason, "run marked failed by dispatch path");
                self.record_audit(AuditEntry::new(
                    *run_id,
                    correlation_id,
                    kind,
                    Some(reason.to_string()),
                ))
                .await;
                return Ok(());
            }
        }
        Err(RepositoryError::Conflict(format!(
            "run {run_id} failure marking contention"
        )))
    }

    /// Record an audit entry, best effort.
    pub async fn record_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.audit.record(&entry).await {
            tracing::warn!(run_id = %entry.run_id, kind = %entry.kind, error = %e, "audit append failed");
        }
    }
}
