//! SQLite persistence for runs and the audit log.

pub mod audit;
pub mod pool;
pub mod run;

pub use audit::SqliteAuditSink;
pub use pool::DatabasePool;
pub use run::SqliteRunRepository;
