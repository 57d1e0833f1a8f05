//! SQLite run repository implementation.
//!
//! Transitions are conditional updates keyed on the current status
//! (`WHERE status = ?`), which serializes state changes per run id;
//! progress is written as `MAX(progress, ?)` so it can never regress at
//! the storage layer.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use agentry_core::repository::{RunRepository, TransitionUpdate};
use agentry_types::error::RepositoryError;
use agentry_types::run::{Run, RunPreview, RunStatus};

use super::pool::DatabasePool;

/// SQLite-backed run repository.
pub struct SqliteRunRepository {
    pool: DatabasePool,
}

impl SqliteRunRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl RunRepository for SqliteRunRepository {
    async fn create(&self, run: &Run) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO runs
               (run_id, tenant_id, department_key, agent_key, correlation_id, status,
                progress, summary, error, preview, estimated_cost_cents, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.run_id.to_string())
        .bind(&run.tenant_id)
        .bind(&run.department_key)
        .bind(&run.agent_key)
        .bind(&run.correlation_id)
        .bind(run.status.to_string())
        .bind(run.progress as i64)
        .bind(&run.summary)
        .bind(&run.error)
        .bind(run.preview.map(|p| p.to_string()))
        .bind(run.estimated_cost_cents as i64)
        .bind(format_datetime(&run.created_at))
        .bind(format_datetime(&run.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("run {} already exists", run.run_id))
            }
            other => RepositoryError::Query(other.to_string()),
        })?;

        Ok(())
    }

    async fn get(&self, run_id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM runs WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| RunRow::from_row(&r).and_then(RunRow::into_run))
            .transpose()
    }

    async fn apply_transition(
        &self,
        run_id: &Uuid,
        expected_status: RunStatus,
        update: &TransitionUpdate,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE runs
               SET status = ?,
                   progress = MAX(progress, ?),
                   summary = COALESCE(?, summary),
                   error = COALESCE(?, error),
                   updated_at = ?
               WHERE run_id = ? AND status = ?"#,
        )
        .bind(update.new_status.to_string())
        .bind(update.progress as i64)
        .bind(&update.summary)
        .bind(&update.error)
        .bind(format_datetime(&Utc::now()))
        .bind(run_id.to_string())
        .bind(expected_status.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_recent(&self, tenant_id: &str, limit: i64) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM runs WHERE tenant_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            runs.push(RunRow::from_row(row)?.into_run()?);
        }
        Ok(runs)
    }
}

// ---------------------------------------------------------------------------
// Private Row types
// ---------------------------------------------------------------------------

struct RunRow {
    run_id: String,
    tenant_id: String,
    department_key: String,
    agent_key: String,
    correlation_id: String,
    status: String,
    progress: i64,
    summary: Option<String>,
    error: Option<String>,
    preview: Option<String>,
    estimated_cost_cents: i64,
    created_at: String,
    updated_at: String,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, RepositoryError> {
        let read = |e: sqlx::Error| RepositoryError::Query(e.to_string());
        Ok(Self {
            run_id: row.try_get("run_id").map_err(read)?,
            tenant_id: row.try_get("tenant_id").map_err(read)?,
            department_key: row.try_get("department_key").map_err(read)?,
            agent_key: row.try_get("agent_key").map_err(read)?,
            correlation_id: row.try_get("correlation_id").map_err(read)?,
            status: row.try_get("status").map_err(read)?,
            progress: row.try_get("progress").map_err(read)?,
            summary: row.try_get("summary").map_err(read)?,
            error: row.try_get("error").map_err(read)?,
            preview: row.try_get("preview").map_err(read)?,
            estimated_cost_cents: row.try_get("estimated_cost_cents").map_err(read)?,
            created_at: row.try_get("created_at").map_err(read)?,
            updated_at: row.try_get("updated_at").map_err(read)?,
        })
    }

    fn into_run(self) -> Result<Run, RepositoryError> {
        let run_id = Uuid::parse_str(&self.run_id)
            .map_err(|e| RepositoryError::Query(format!("invalid run_id: {e}")))?;
        let status: RunStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let preview: Option<RunPreview> = self
            .preview
            .map(|p| p.parse())
            .transpose()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(Run {
            run_id,
            tenant_id: self.tenant_id,
            department_key: self.department_key,
            agent_key: self.agent_key,
            correlation_id: self.correlation_id,
            status,
            progress: self.progress.clamp(0, 100) as u8,
            summary: self.summary,
            error: self.error,
            preview,
            estimated_cost_cents: self.estimated_cost_cents.max(0) as u64,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
