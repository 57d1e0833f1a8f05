use thiserror::Error;

/// Errors from signature verification.
///
/// A bad signature and a stale timestamp are deliberately collapsed into the
/// single `Rejected` variant so callers cannot distinguish them. The
/// server-side log is the only place the difference is recorded.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature rejected")]
    Rejected,

    #[error("invalid signature key: {0}")]
    InvalidKey(String),
}

/// Errors from the trigger admission pipeline.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("invalid trigger body: {0}")]
    Validation(String),

    #[error("unknown agent: '{0}'")]
    UnknownAgent(String),

    #[error("store failure: {0}")]
    Store(#[from] RepositoryError),
}

/// Errors from webhook event ingestion.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("invalid event body: {0}")]
    Validation(String),

    #[error("run not found: {0}")]
    UnknownRun(uuid::Uuid),

    #[error("store failure: {0}")]
    Store(#[from] RepositoryError),
}

/// Errors from an outbound dispatch to an agent executor.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Rejected locally because the agent's circuit breaker is open.
    /// No network call was made.
    #[error("circuit open for agent '{0}'")]
    CircuitOpen(String),

    #[error("dispatch timed out after {0}ms")]
    Timeout(u64),

    #[error("executor error ({status}): {message}")]
    Executor { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl DispatchError {
    /// Whether the retry policy may re-attempt after this error.
    ///
    /// Timeouts, transport failures, and executor 5xx responses are
    /// transient. Circuit-open rejections, executor 4xx responses, and
    /// exhaustion are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Timeout(_) | DispatchError::Transport(_) => true,
            DispatchError::Executor { status, .. } => *status >= 500,
            DispatchError::CircuitOpen(_) | DispatchError::Exhausted { .. } => false,
        }
    }
}

/// Errors from repository operations (used by trait definitions in agentry-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from agent catalog loading and validation.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog contains no agents")]
    Empty,

    #[error("agent key must not be empty")]
    EmptyKey,

    #[error("duplicate agent key: '{0}'")]
    DuplicateKey(String),

    #[error("agent '{0}': department_key must not be empty")]
    EmptyDepartment(String),

    #[error("agent '{agent}': budget_weight {weight} outside {min}..={max}")]
    BudgetWeightOutOfRange {
        agent: String,
        weight: f64,
        min: f64,
        max: f64,
    },

    #[error("agent '{0}': sla_minutes must be greater than zero")]
    ZeroSla(String),

    #[error("failed to read catalog: {0}")]
    Io(String),

    #[error("failed to parse catalog: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_error_display() {
        let err = TriggerError::MissingHeader("idempotency-key");
        assert_eq!(err.to_string(), "missing required header: idempotency-key");
    }

    #[test]
    fn test_signature_error_is_opaque() {
        // One variant covers both bad-signature and stale-timestamp so the
        // message leaks nothing about which check failed.
        assert_eq!(SignatureError::Rejected.to_string(), "signature rejected");
    }

    #[test]
    fn test_dispatch_error_retryable_classification() {
        assert!(DispatchError::Timeout(30_000).is_retryable());
        assert!(DispatchError::Transport("connection reset".into()).is_retryable());
        assert!(
            DispatchError::Executor {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );

        assert!(
            !DispatchError::Executor {
                status: 422,
                message: "bad payload".into()
            }
            .is_retryable()
        );
        assert!(!DispatchError::CircuitOpen("sales_followup".into()).is_retryable());
        assert!(
            !DispatchError::Exhausted {
                attempts: 4,
                last: "timeout".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError::BudgetWeightOutOfRange {
            agent: "trend_scan".to_string(),
            weight: 4.5,
            min: 0.1,
            max: 3.0,
        };
        assert!(err.to_string().contains("trend_scan"));
        assert!(err.to_string().contains("4.5"));
    }
}
