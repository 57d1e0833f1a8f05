//! Trigger admission pipeline.
//!
//! Orders the gates exactly: header presence -> signature -> body schema ->
//! idempotency -> budget -> run creation -> async dispatch hand-off. Each
//! gate fails fast; side effects are strictly ordered so the idempotency
//! commit happens before budget reservation and a duplicate request can
//! never double-reserve budget.

use std::sync::Arc;

use uuid::Uuid;

use agentry_types::agent::AgentCatalog;
use agentry_types::audit::{AuditEntry, AuditKind};
use agentry_types::error::{DispatchError, TriggerError};
use agentry_types::run::{Run, RunPreview, RunStatus};
use agentry_types::trigger::TriggerBody;

use crate::budget::BudgetLedger;
use crate::cost::estimate_cost_cents;
use crate::executor::{DispatchRequest, ExecutorClient};
use crate::idempotency::{IdempotencyStore, Namespace};
use crate::registry::RunRegistry;
use crate::repository::{AuditSink, RunRepository};
use crate::resilience::ConnectorPool;
use crate::signature::SignatureVerifier;

/// The headers a trigger request must carry. `None` means absent.
#[derive(Debug, Clone, Default)]
pub struct TriggerHeaders {
    pub authorization: Option<String>,
    pub correlation_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
}

/// How the pipeline disposed of a trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fresh admission; dispatch handed off (HTTP 202).
    Admitted,
    /// Replay of a seen idempotency key; recorded outcome returned (200).
    Duplicate,
    /// Budget guard held the run back (200).
    BudgetStopped,
    /// Validated and priced without dispatching (200).
    DryRun,
}

/// Result of a trigger request, consumed by the HTTP layer.
#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub disposition: Disposition,
    pub run_id: Uuid,
    pub status: RunStatus,
    pub preview: Option<RunPreview>,
    /// Value for the `X-Est-Cost-EUR` header, in cents. Zero for
    /// duplicates and budget-stopped requests (nothing was charged).
    pub est_cost_cents: u64,
    /// Projected budget usage for the `X-Budget-Pct` header.
    pub budget_pct: f64,
    pub correlation_id: String,
}

/// Tuning the dispatcher needs from the orchestrator config.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub trigger_ttl: chrono::Duration,
    pub base_rate_cents: u64,
}

/// The trigger admission pipeline.
pub struct TriggerDispatcher<R, A, E, V>
where
    R: RunRepository + 'static,
    A: AuditSink + 'static,
    E: ExecutorClient + 'static,
    V: SignatureVerifier,
{
    catalog: Arc<AgentCatalog>,
    verifier: V,
    idempotency: Arc<IdempotencyStore>,
    budget: Arc<BudgetLedger>,
    registry: Arc<RunRegistry<R, A>>,
    connectors: Arc<ConnectorPool<E>>,
    settings: DispatcherSettings,
}

impl<R, A, E, V> TriggerDispatcher<R, A, E, V>
where
    R: RunRepository + 'static,
    A: AuditSink + 'static,
    E: ExecutorClient + 'static,
    V: SignatureVerifier,
{
    pub fn new(
        catalog: Arc<AgentCatalog>,
        verifier: V,
        idempotency: Arc<IdempotencyStore>,
        budget: Arc<BudgetLedger>,
        registry: Arc<RunRegistry<R, A>>,
        connectors: Arc<ConnectorPool<E>>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            catalog,
            verifier,
            idempotency,
            budget,
            registry,
            connectors,
            settings,
        }
    }

    /// Admit or reject one trigger request.
    pub async fn trigger(
        &self,
        agent_key: &str,
        headers: &TriggerHeaders,
        raw_body: &[u8],
    ) -> Result<TriggerOutcome, TriggerError> {
        // Gate 1: header presence, before anything else touches the request.
        let _authorization = require(&headers.authorization, "authorization")?;
        let correlation_id = require(&headers.correlation_id, "x-correlation-id")?.to_string();
        let idempotency_key = require(&headers.idempotency_key, "idempotency-key")?.to_string();
        let timestamp = require(&headers.timestamp, "x-timestamp")?;
        let signature = require(&headers.signature, "x-signature")?;

        // Gate 2: HMAC over timestamp + body, bounded replay window.
        self.verifier.verify(Some(timestamp), raw_body, signature)?;

        // Gate 3: body schema, surfacing the first validation error.
        let body: TriggerBody = serde_json::from_slice(raw_body)
            .map_err(|e| TriggerError::Validation(e.to_string()))?;
        body.validate().map_err(TriggerError::Validation)?;

        let def = self
            .catalog
            .get(agent_key)
            .ok_or_else(|| TriggerError::UnknownAgent(agent_key.to_string()))?;

        let est_cents = estimate_cost_cents(def, self.settings.base_rate_cents, body.payload_len());

        // Gate 4: idempotency check-and-set. The producer only mints the run
        // id; the run itself is persisted after the admission decision.
        let (record, was_first) = self.idempotency.get_or_init(
            Namespace::Trigger,
            &idempotency_key,
            self.settings.trigger_ttl,
            || (Uuid::now_v7(), RunStatus::Queued),
        );

        if !was_first {
            tracing::info!(
                run_id = %record.run_id,
                agent_key,
                correlation_id = %correlation_id,
                "duplicate trigger, replaying recorded outcome"
            );
            self.registry
                .record_audit(AuditEntry::new(
                    record.run_id,
                    &correlation_id,
                    AuditKind::TriggerDuplicate,
                    None,
                ))
                .await;
            return Ok(TriggerOutcome {
                disposition: Disposition::Duplicate,
                run_id: record.run_id,
                status: record.status,
                preview: None,
                est_cost_cents: 0,
                budget_pct: 0.0,
                correlation_id,
            });
        }

        let mut run = Run::new(&body.org_id, &def.department_key, agent_key, &correlation_id);
        run.run_id = record.run_id;

        // Dry run: validated and priced, never charged, never dispatched.
        if body.dry_run {
            run = run.with_preview(RunPreview::DryRun);
            self.registry.create(&run).await?;
            self.registry
                .record_audit(AuditEntry::new(
                    run.run_id,
                    &correlation_id,
                    AuditKind::DryRun,
                    Some(format!("estimated {est_cents} cents")),
                ))
                .await;
            return Ok(TriggerOutcome {
                disposition: Disposition::DryRun,
                run_id: run.run_id,
                status: run.status,
                preview: Some(RunPreview::DryRun),
                est_cost_cents: est_cents,
                budget_pct: 0.0,
                correlation_id,
            });
        }

        // Gate 5: budget test-and-increment, after the idempotency commit.
        let decision = self.budget.check_and_reserve(&def.department_key, est_cents);
        if !decision.admitted {
            run = run.with_preview(RunPreview::BudgetStop);
            self.registry.create(&run).await?;
            self.registry
                .record_audit(AuditEntry::new(
                    run.run_id,
                    &correlation_id,
                    AuditKind::BudgetStop,
                    Some(format!("pct_used={:.1}", decision.pct_used)),
                ))
                .await;
            return Ok(TriggerOutcome {
                disposition: Disposition::BudgetStopped,
                run_id: run.run_id,
                status: run.status,
                preview: Some(RunPreview::BudgetStop),
                est_cost_cents: 0,
                budget_pct: decision.pct_used,
                correlation_id,
            });
        }

        // Gate 6: persist the run and hand off dispatch asynchronously.
        run.estimated_cost_cents = est_cents;
        self.registry.create(&run).await?;
        self.registry
            .record_audit(AuditEntry::new(
                run.run_id,
                &correlation_id,
                AuditKind::TriggerAdmitted,
                Some(format!(
                    "estimated {est_cents} cents, budget {:.1}%",
                    decision.pct_used
                )),
            ))
            .await;
        tracing::info!(
            run_id = %run.run_id,
            agent_key,
            department_key = %def.department_key,
            est_cents,
            correlation_id = %correlation_id,
            "trigger admitted"
        );

        let request = DispatchRequest {
            run_id: run.run_id,
            agent_key: agent_key.to_string(),
            tenant_id: body.org_id.clone(),
            correlation_id: correlation_id.clone(),
            payload: body.payload.clone(),
            estimated_cost_cents: est_cents,
        };
        let connectors = Arc::clone(&self.connectors);
        let registry = Arc::clone(&self.registry);
        let idempotency = Arc::clone(&self.idempotency);
        let spawn_correlation = correlation_id.clone();
        tokio::spawn(async move {
            if let Err(err) = connectors.dispatch(&request).await {
                let (reason, kind) = match &err {
                    DispatchError::CircuitOpen(_) => ("circuit_open".to_string(), AuditKind::CircuitOpen),
                    other => (other.to_string(), AuditKind::DispatchFailed),
                };
                if let Err(store_err) = registry
                    .mark_failed(&request.run_id, &reason, kind, &spawn_correlation)
                    .await
                {
                    tracing::error!(
                        run_id = %request.run_id,
                        error = %store_err,
                        "failed to record dispatch failure"
                    );
                }
                idempotency.finalize_run(request.run_id, RunStatus::Failed);
            }
        });

        Ok(TriggerOutcome {
            disposition: Disposition::Admitted,
            run_id: run.run_id,
            status: run.status,
            preview: None,
            est_cost_cents: est_cents,
            budget_pct: decision.pct_used,
            correlation_id,
        })
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, TriggerError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(TriggerError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::HealthTracker;
    use crate::test_support::{
        MemoryRunRepository, RecordingAuditSink, ScriptedExecutor, ScriptedResponse, StaticVerifier,
    };
    use agentry_types::agent::{AgentDefinition, AgentKind};
    use agentry_types::config::{BreakerConfig, DepartmentBudget, RetryConfig};
    use std::time::Duration;

    type TestDispatcher =
        TriggerDispatcher<MemoryRunRepository, RecordingAuditSink, ScriptedExecutor, StaticVerifier>;

    struct Harness {
        dispatcher: TestDispatcher,
        budget: Arc<BudgetLedger>,
        registry: Arc<RunRegistry<MemoryRunRepository, RecordingAuditSink>>,
        connectors: Arc<ConnectorPool<ScriptedExecutor>>,
        idempotency: Arc<IdempotencyStore>,
    }

    fn catalog() -> AgentCatalog {
        AgentCatalog::new(vec![
            AgentDefinition {
                agent_key: "sales_followup".to_string(),
                department_key: "sales".to_string(),
                kind: AgentKind::Agent,
                hitl: false,
                sla_minutes: 60,
                budget_weight: 1.0,
            },
            AgentDefinition {
                agent_key: "trend_scan".to_string(),
                department_key: "marketing".to_string(),
                kind: AgentKind::Agent,
                hitl: false,
                sla_minutes: 120,
                budget_weight: 2.0,
            },
        ])
        .unwrap()
    }

    fn harness(executor: ScriptedExecutor) -> Harness {
        let budget = Arc::new(BudgetLedger::new(&[DepartmentBudget {
            department_key: "sales".to_string(),
            monthly_budget_eur: 100.0,
        }]));
        let registry = Arc::new(RunRegistry::new(
            MemoryRunRepository::new(),
            RecordingAuditSink::new(),
        ));
        let connectors = Arc::new(ConnectorPool::new(
            executor,
            BreakerConfig::default(),
            RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            },
            Duration::from_secs(30),
            Arc::new(HealthTracker::new(Duration::from_secs(3600), 100)),
        ));
        let idempotency = Arc::new(IdempotencyStore::new());

        let dispatcher = TriggerDispatcher::new(
            Arc::new(catalog()),
            StaticVerifier::accepting("good-sig"),
            Arc::clone(&idempotency),
            Arc::clone(&budget),
            Arc::clone(&registry),
            Arc::clone(&connectors),
            DispatcherSettings {
                trigger_ttl: chrono::Duration::minutes(15),
                base_rate_cents: 100,
            },
        );

        Harness {
            dispatcher,
            budget,
            registry,
            connectors,
            idempotency,
        }
    }

    fn headers(idempotency_key: &str) -> TriggerHeaders {
        TriggerHeaders {
            authorization: Some("Bearer cockpit-token".to_string()),
            correlation_id: Some("corr-1".to_string()),
            idempotency_key: Some(idempotency_key.to_string()),
            timestamp: Some("1700000000".to_string()),
            signature: Some("good-sig".to_string()),
        }
    }

    fn body(dry_run: bool) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "request_id": Uuid::now_v7(),
            "org_id": "org-acme",
            "actor": "cockpit",
            "payload": {},
            "dryRun": dry_run,
        }))
        .unwrap()
    }

    async fn settle() {
        // Let the spawned dispatch task run to completion.
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_missing_header_fails_fast() {
        let h = harness(ScriptedExecutor::always_accepting());
        let mut hdrs = headers("key-1");
        hdrs.idempotency_key = None;

        let err = h
            .dispatcher
            .trigger("sales_followup", &hdrs, &body(false))
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::MissingHeader("idempotency-key")));
        // Nothing else happened
        assert_eq!(h.budget.spent_cents("sales"), Some(0));
        assert!(h.idempotency.is_empty());
    }

    #[tokio::test]
    async fn test_bad_signature_rejected_before_validation() {
        let h = harness(ScriptedExecutor::always_accepting());
        let mut hdrs = headers("key-1");
        hdrs.signature = Some("forged".to_string());

        let err = h
            .dispatcher
            .trigger("sales_followup", &hdrs, b"not even json")
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::Signature(_)));
    }

    #[tokio::test]
    async fn test_invalid_body_surfaces_first_error() {
        let h = harness(ScriptedExecutor::always_accepting());
        let bad = serde_json::to_vec(&serde_json::json!({
            "request_id": "not-a-uuid",
            "org_id": "org-acme",
            "actor": "cockpit",
            "payload": {},
        }))
        .unwrap();

        let err = h
            .dispatcher
            .trigger("sales_followup", &headers("key-1"), &bad)
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let h = harness(ScriptedExecutor::always_accepting());
        let err = h
            .dispatcher
            .trigger("no_such_agent", &headers("key-1"), &body(false))
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::UnknownAgent(_)));
    }

    #[tokio::test]
    async fn test_admission_creates_run_and_dispatches() {
        let h = harness(ScriptedExecutor::always_accepting());
        let outcome = h
            .dispatcher
            .trigger("sales_followup", &headers("key-1"), &body(false))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, Disposition::Admitted);
        assert_eq!(outcome.status, RunStatus::Queued);
        assert_eq!(outcome.est_cost_cents, 100);
        assert!(outcome.budget_pct > 0.0);

        let run = h.registry.get(&outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.agent_key, "sales_followup");
        assert_eq!(run.department_key, "sales");
        assert_eq!(run.estimated_cost_cents, 100);
        assert_eq!(h.budget.spent_cents("sales"), Some(100));

        settle().await;
        assert_eq!(h.connectors.client.calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_replays_without_side_effects() {
        let h = harness(ScriptedExecutor::always_accepting());
        let first = h
            .dispatcher
            .trigger("sales_followup", &headers("key-1"), &body(false))
            .await
            .unwrap();
        settle().await;

        let second = h
            .dispatcher
            .trigger("sales_followup", &headers("key-1"), &body(false))
            .await
            .unwrap();

        assert_eq!(second.disposition, Disposition::Duplicate);
        assert_eq!(second.run_id, first.run_id);
        assert_eq!(second.est_cost_cents, 0);
        // No second budget reservation, no second dispatch
        assert_eq!(h.budget.spent_cents("sales"), Some(100));
        settle().await;
        assert_eq!(h.connectors.client.calls(), 1);
    }

    #[tokio::test]
    async fn test_budget_stop_charges_nothing() {
        let h = harness(ScriptedExecutor::always_accepting());
        // Pre-spend 99.50 of the 100.00 budget
        assert!(h.budget.check_and_reserve("sales", 9_950).admitted);

        let outcome = h
            .dispatcher
            .trigger("sales_followup", &headers("key-1"), &body(false))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, Disposition::BudgetStopped);
        assert_eq!(outcome.status, RunStatus::Queued);
        assert_eq!(outcome.preview, Some(RunPreview::BudgetStop));
        assert_eq!(outcome.est_cost_cents, 0);
        assert!((outcome.budget_pct - 100.5).abs() < 1e-9);
        assert_eq!(h.budget.spent_cents("sales"), Some(9_950));

        let run = h.registry.get(&outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.preview, Some(RunPreview::BudgetStop));
        assert_eq!(run.status, RunStatus::Queued);

        settle().await;
        assert_eq!(h.connectors.client.calls(), 0, "budget stop never dispatches");
    }

    #[tokio::test]
    async fn test_budget_stopped_run_does_not_auto_resume() {
        let h = harness(ScriptedExecutor::always_accepting());
        assert!(h.budget.check_and_reserve("sales", 9_950).admitted);

        let stopped = h
            .dispatcher
            .trigger("sales_followup", &headers("key-1"), &body(false))
            .await
            .unwrap();
        assert_eq!(stopped.disposition, Disposition::BudgetStopped);

        // Replaying the same key replays the stop; only a NEW trigger (new
        // key, fresh signature) can proceed.
        let replay = h
            .dispatcher
            .trigger("sales_followup", &headers("key-1"), &body(false))
            .await
            .unwrap();
        assert_eq!(replay.disposition, Disposition::Duplicate);
        assert_eq!(replay.run_id, stopped.run_id);
        settle().await;
        assert_eq!(h.connectors.client.calls(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_reserves_nothing_and_dispatches_nothing() {
        let h = harness(ScriptedExecutor::always_accepting());
        let outcome = h
            .dispatcher
            .trigger("sales_followup", &headers("key-1"), &body(true))
            .await
            .unwrap();

        assert_eq!(outcome.disposition, Disposition::DryRun);
        assert_eq!(outcome.preview, Some(RunPreview::DryRun));
        // The estimate is shown but nothing is charged
        assert_eq!(outcome.est_cost_cents, 100);
        assert_eq!(h.budget.spent_cents("sales"), Some(0));

        settle().await;
        assert_eq!(h.connectors.client.calls(), 0);
    }

    #[tokio::test]
    async fn test_unmetered_department_admitted() {
        let h = harness(ScriptedExecutor::always_accepting());
        let outcome = h
            .dispatcher
            .trigger("trend_scan", &headers("key-1"), &body(false))
            .await
            .unwrap();
        assert_eq!(outcome.disposition, Disposition::Admitted);
        assert_eq!(outcome.budget_pct, 0.0);
        // weight 2.0 on a 100-cent base
        assert_eq!(outcome.est_cost_cents, 200);
        assert_eq!(h.budget.spent_cents("marketing"), None);
    }

    #[tokio::test]
    async fn test_dispatch_failure_marks_run_failed() {
        let h = harness(ScriptedExecutor::new(vec![ScriptedResponse::Fail(
            DispatchError::Executor {
                status: 422,
                message: "rejected".to_string(),
            },
        )]));

        let outcome = h
            .dispatcher
            .trigger("sales_followup", &headers("key-1"), &body(false))
            .await
            .unwrap();
        assert_eq!(outcome.disposition, Disposition::Admitted);

        settle().await;

        let run = h.registry.get(&outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.is_some());

        // Late duplicates see the terminal status, not the queued snapshot
        let replay = h
            .dispatcher
            .trigger("sales_followup", &headers("key-1"), &body(false))
            .await
            .unwrap();
        assert_eq!(replay.disposition, Disposition::Duplicate);
        assert_eq!(replay.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_admit_exactly_once() {
        let h = Arc::new(harness(ScriptedExecutor::always_accepting()));

        let mut handles = Vec::new();
        for _ in 0..25 {
            let h = Arc::clone(&h);
            let raw = body(false);
            handles.push(tokio::spawn(async move {
                h.dispatcher
                    .trigger("sales_followup", &headers("contended"), &raw)
                    .await
                    .unwrap()
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let admitted = outcomes
            .iter()
            .filter(|o| o.disposition == Disposition::Admitted)
            .count();
        assert_eq!(admitted, 1, "exactly one admission per idempotency key");

        let winner = outcomes
            .iter()
            .find(|o| o.disposition == Disposition::Admitted)
            .unwrap()
            .run_id;
        assert!(outcomes.iter().all(|o| o.run_id == winner));
        // Exactly one budget reservation
        assert_eq!(h.budget.spent_cents("sales"), Some(100));
    }
}
