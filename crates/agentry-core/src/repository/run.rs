//! Run repository trait definition.

use uuid::Uuid;

use agentry_types::error::RepositoryError;
use agentry_types::run::{Run, RunStatus};

/// Fields written by a state transition.
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    pub new_status: RunStatus,
    /// Applied as `max(current, progress)` -- progress never regresses at
    /// the storage layer even under racing writers.
    pub progress: u8,
    pub summary: Option<String>,
    pub error: Option<String>,
}

/// Repository trait for run persistence.
///
/// Implementations live in agentry-infra (e.g. SqliteRunRepository).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait RunRepository: Send + Sync {
    /// Persist a freshly created run.
    fn create(
        &self,
        run: &Run,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Fetch a run by id.
    fn get(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Run>, RepositoryError>> + Send;

    /// Apply a transition conditionally: the write only lands if the run is
    /// still in `expected_status`. Returns false when a concurrent writer
    /// got there first (the caller re-reads and re-evaluates).
    ///
    /// This conditional update is what serializes transitions per run id.
    fn apply_transition(
        &self,
        run_id: &Uuid,
        expected_status: RunStatus,
        update: &TransitionUpdate,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Most recent runs for a tenant, newest first.
    fn list_recent(
        &self,
        tenant_id: &str,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;
}
