//! SQLite audit log implementation.
//!
//! Append-only record of admission decisions and state transitions, with
//! query methods for run-scoped trails.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use agentry_core::repository::AuditSink;
use agentry_types::audit::{AuditEntry, AuditKind};
use agentry_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed audit sink.
pub struct SqliteAuditSink {
    pool: DatabasePool,
}

impl SqliteAuditSink {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// All audit entries for a run, oldest first.
    pub async fn get_for_run(&self, run_id: &Uuid) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM run_audit_log WHERE run_id = ? ORDER BY created_at ASC",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(row_to_entry(row)?);
        }
        Ok(entries)
    }
}

impl AuditSink for SqliteAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO run_audit_log (id, run_id, correlation_id, kind, detail, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.run_id.to_string())
        .bind(&entry.correlation_id)
        .bind(entry.kind.to_string())
        .bind(&entry.detail)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEntry, RepositoryError> {
    let read = |e: sqlx::Error| RepositoryError::Query(e.to_string());

    let id: String = row.try_get("id").map_err(read)?;
    let run_id: String = row.try_get("run_id").map_err(read)?;
    let kind: String = row.try_get("kind").map_err(read)?;
    let created_at: String = row.try_get("created_at").map_err(read)?;

    Ok(AuditEntry {
        id: Uuid::parse_str(&id)
            .map_err(|e| RepositoryError::Query(format!("invalid audit id: {e}")))?,
        run_id: Uuid::parse_str(&run_id)
            .map_err(|e| RepositoryError::Query(format!("invalid run_id: {e}")))?,
        correlation_id: row.try_get("correlation_id").map_err(read)?,
        kind: kind
            .parse::<AuditKind>()
            .map_err(RepositoryError::Query)?,
        detail: row.try_get("detail").map_err(read)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))?,
    })
}
