//! Repository and sink trait definitions.
//!
//! Implementations live in agentry-infra (e.g. `SqliteRunRepository`,
//! `SqliteAuditSink`).

pub mod audit;
pub mod run;

pub use audit::AuditSink;
pub use run::{RunRepository, TransitionUpdate};
