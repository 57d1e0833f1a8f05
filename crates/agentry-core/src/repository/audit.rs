//! Audit sink trait definition.

use agentry_types::audit::AuditEntry;
use agentry_types::error::RepositoryError;

/// Append-only sink for admission decisions and state transitions.
///
/// The registry treats audit writes as best-effort: a failed append is
/// logged and never fails the request that produced it.
pub trait AuditSink: Send + Sync {
    fn record(
        &self,
        entry: &AuditEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
