//! Application state wiring all services together.
//!
//! Services in agentry-core are generic over repository/verifier/executor
//! traits; AppState pins them to the concrete infra implementations.

use std::sync::Arc;
use std::time::Duration;

use agentry_core::budget::BudgetLedger;
use agentry_core::dispatch::{DispatcherSettings, TriggerDispatcher};
use agentry_core::idempotency::IdempotencyStore;
use agentry_core::ingest::WebhookIngestor;
use agentry_core::registry::RunRegistry;
use agentry_core::resilience::{ConnectorPool, HealthTracker};
use agentry_infra::executor::HttpExecutorClient;
use agentry_infra::signature::HmacSignatureVerifier;
use agentry_infra::sqlite::{DatabasePool, SqliteAuditSink, SqliteRunRepository};
use agentry_types::agent::AgentCatalog;
use agentry_types::config::OrchestratorConfig;

/// Window length for rolling agent health statistics.
const HEALTH_WINDOW: Duration = Duration::from_secs(3600);
/// Health samples retained per agent.
const HEALTH_MAX_SAMPLES: usize = 512;
/// Interval for sweeping expired idempotency records.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteRegistry = RunRegistry<SqliteRunRepository, SqliteAuditSink>;

pub type ConcreteDispatcher = TriggerDispatcher<
    SqliteRunRepository,
    SqliteAuditSink,
    HttpExecutorClient,
    HmacSignatureVerifier,
>;

pub type ConcreteIngestor =
    WebhookIngestor<SqliteRunRepository, SqliteAuditSink, HmacSignatureVerifier>;

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<AgentCatalog>,
    pub dispatcher: Arc<ConcreteDispatcher>,
    pub ingestor: Arc<ConcreteIngestor>,
    pub registry: Arc<ConcreteRegistry>,
    pub connectors: Arc<ConnectorPool<HttpExecutorClient>>,
    pub budget: Arc<BudgetLedger>,
    pub health: Arc<HealthTracker>,
    pub idempotency: Arc<IdempotencyStore>,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: connect to the database, build the
    /// verifiers from the configured secrets, wire services, and start the
    /// idempotency sweep task.
    pub async fn init(
        config: OrchestratorConfig,
        catalog: AgentCatalog,
        database_url: &str,
    ) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(database_url).await?;

        let registry = Arc::new(RunRegistry::new(
            SqliteRunRepository::new(db_pool.clone()),
            SqliteAuditSink::new(db_pool.clone()),
        ));

        let health = Arc::new(HealthTracker::new(HEALTH_WINDOW, HEALTH_MAX_SAMPLES));
        let connectors = Arc::new(ConnectorPool::new(
            HttpExecutorClient::new(config.dispatch.executor_url.clone()),
            config.breaker.clone(),
            config.retry.clone(),
            config.dispatch.timeout(),
            Arc::clone(&health),
        ));

        let idempotency = Arc::new(IdempotencyStore::new());
        let budget = Arc::new(BudgetLedger::new(&config.budgets));
        let catalog = Arc::new(catalog);

        // Each surface gets its own secret and scheme: triggers sign
        // "{timestamp}.{body}" with a replay window, webhooks sign the body.
        let trigger_verifier = HmacSignatureVerifier::timestamped(
            config.trigger_secret,
            config.signature.max_skew_seconds,
        );
        let webhook_verifier = HmacSignatureVerifier::body_only(config.webhook_secret);

        let dispatcher = Arc::new(TriggerDispatcher::new(
            Arc::clone(&catalog),
            trigger_verifier,
            Arc::clone(&idempotency),
            Arc::clone(&budget),
            Arc::clone(&registry),
            Arc::clone(&connectors),
            DispatcherSettings {
                trigger_ttl: chrono::Duration::minutes(config.idempotency.trigger_ttl_minutes),
                base_rate_cents: config.cost.base_rate_cents,
            },
        ));

        let ingestor = Arc::new(WebhookIngestor::new(
            webhook_verifier,
            Arc::clone(&idempotency),
            Arc::clone(&registry),
            Arc::clone(&health),
            chrono::Duration::minutes(config.idempotency.event_ttl_minutes),
        ));

        // Periodic sweep complements lazy eviction on read.
        let sweeper = Arc::clone(&idempotency);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                sweeper.sweep();
            }
        });

        Ok(Self {
            catalog,
            dispatcher,
            ingestor,
            registry,
            connectors,
            budget,
            health,
            idempotency,
            db_pool,
        })
    }
}
