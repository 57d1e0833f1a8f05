//! Webhook event ingestion.
//!
//! Applies asynchronous executor callbacks to the run registry. Order
//! matters: signature first, then event-level idempotency, then schema,
//! then the state transition -- and the event key is marked seen only
//! AFTER the mutation commits. A crash between mutation and marking leads
//! to a safe idempotent re-application, never to data loss.

use std::sync::Arc;

use uuid::Uuid;

use agentry_types::audit::{AuditEntry, AuditKind};
use agentry_types::error::EventError;
use agentry_types::event::{EventStatus, ExecutorEvent};
use agentry_types::run::Run;

use crate::idempotency::{IdempotencyStore, Namespace};
use crate::registry::{ApplyOutcome, RunRegistry};
use crate::repository::{AuditSink, RunRepository};
use crate::resilience::HealthTracker;
use crate::signature::SignatureVerifier;

/// Headers of an incoming webhook event. `None` means absent.
#[derive(Debug, Clone, Default)]
pub struct EventHeaders {
    pub signature: Option<String>,
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<String>,
}

/// What ingesting an event did, for the HTTP response body.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// The transition landed.
    Applied { run: Run },
    /// The event key was already seen; acknowledged, nothing changed.
    Duplicate { run_id: Uuid },
    /// The event was acknowledged but produced no state change (terminal
    /// run, disallowed transition, or progress regression).
    Ignored { run: Run, reason: &'static str },
}

/// The webhook ingestion pipeline.
pub struct WebhookIngestor<R, A, V>
where
    R: RunRepository + 'static,
    A: AuditSink + 'static,
    V: SignatureVerifier,
{
    verifier: V,
    idempotency: Arc<IdempotencyStore>,
    registry: Arc<RunRegistry<R, A>>,
    health: Arc<HealthTracker>,
    event_ttl: chrono::Duration,
}

impl<R, A, V> WebhookIngestor<R, A, V>
where
    R: RunRepository + 'static,
    A: AuditSink + 'static,
    V: SignatureVerifier,
{
    pub fn new(
        verifier: V,
        idempotency: Arc<IdempotencyStore>,
        registry: Arc<RunRegistry<R, A>>,
        health: Arc<HealthTracker>,
        event_ttl: chrono::Duration,
    ) -> Self {
        Self {
            verifier,
            idempotency,
            registry,
            health,
            event_ttl,
        }
    }

    /// Ingest one executor event.
    pub async fn ingest(
        &self,
        headers: &EventHeaders,
        raw_body: &[u8],
    ) -> Result<IngestOutcome, EventError> {
        let signature = require(&headers.signature, "x-signature")?;
        let event_key = require(&headers.idempotency_key, "x-idempotency-key")?.to_string();
        let correlation_id = headers
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        // Webhook signatures cover the raw body alone (no timestamp header
        // on this surface).
        self.verifier.verify(None, raw_body, signature)?;

        // Duplicate events acknowledge without touching the registry.
        if let Some(record) = self.idempotency.seen(Namespace::Event, &event_key) {
            tracing::info!(
                run_id = %record.run_id,
                event_key = %event_key,
                "duplicate webhook event acknowledged"
            );
            self.registry
                .record_audit(AuditEntry::new(
                    record.run_id,
                    &correlation_id,
                    AuditKind::EventDuplicate,
                    None,
                ))
                .await;
            return Ok(IngestOutcome::Duplicate {
                run_id: record.run_id,
            });
        }

        let event: ExecutorEvent = serde_json::from_slice(raw_body)
            .map_err(|e| EventError::Validation(e.to_string()))?;
        event.validate().map_err(EventError::Validation)?;

        let outcome = self.registry.apply_event(&event, &correlation_id).await?;

        // Mark the key seen only now, after the mutation committed.
        let run = outcome.run();
        self.idempotency.mark(
            Namespace::Event,
            &event_key,
            run.run_id,
            run.status,
            self.event_ttl,
        );

        if let ApplyOutcome::Applied(run) = &outcome {
            if run.status.is_terminal() {
                self.idempotency.finalize_run(run.run_id, run.status);
                let duration_ms = (chrono::Utc::now() - run.created_at)
                    .num_milliseconds()
                    .max(0) as u64;
                match event.status {
                    EventStatus::Completed => self.health.record_success(
                        &run.agent_key,
                        duration_ms,
                        run.estimated_cost_cents,
                    ),
                    EventStatus::Failed => self.health.record_failure(&run.agent_key, duration_ms),
                    _ => {}
                }
            }
        }

        Ok(match outcome {
            ApplyOutcome::Applied(run) => IngestOutcome::Applied { run },
            ApplyOutcome::Terminal(run) => IngestOutcome::Ignored {
                run,
                reason: "terminal",
            },
            ApplyOutcome::InvalidTransition(run) => IngestOutcome::Ignored {
                run,
                reason: "invalid_transition",
            },
            ApplyOutcome::ProgressRegression(run) => IngestOutcome::Ignored {
                run,
                reason: "progress_regression",
            },
        })
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, EventError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(EventError::MissingHeader(name))
}
