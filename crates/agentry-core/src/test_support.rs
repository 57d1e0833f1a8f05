//! Shared test doubles for core unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use uuid::Uuid;

use agentry_types::audit::AuditEntry;
use agentry_types::error::{DispatchError, RepositoryError, SignatureError};
use agentry_types::run::Run;
use agentry_types::run::RunStatus;

use crate::executor::{DispatchRequest, ExecutorAck, ExecutorClient};
use crate::repository::{AuditSink, RunRepository, TransitionUpdate};
use crate::signature::SignatureVerifier;

/// In-memory run repository with the same conditional-update contract as
/// the SQLite implementation.
pub struct MemoryRunRepository {
    runs: Mutex<HashMap<Uuid, Run>>,
}

impl MemoryRunRepository {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
        }
    }
}

impl RunRepository for MemoryRunRepository {
    async fn create(&self, run: &Run) -> Result<(), RepositoryError> {
        let mut runs = self.runs.lock().unwrap();
        if runs.contains_key(&run.run_id) {
            return Err(RepositoryError::Conflict(format!("run {} exists", run.run_id)));
        }
        runs.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn get(&self, run_id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        Ok(self.runs.lock().unwrap().get(run_id).cloned())
    }

    async fn apply_transition(
        &self,
        run_id: &Uuid,
        expected_status: RunStatus,
        update: &TransitionUpdate,
    ) -> Result<bool, RepositoryError> {
        let mut runs = self.runs.lock().unwrap();
        let Some(run) = runs.get_mut(run_id) else {
            return Err(RepositoryError::NotFound);
        };
        if run.status != expected_status {
            return Ok(false);
        }
        run.status = update.new_status;
        run.progress = run.progress.max(update.progress);
        if update.summary.is_some() {
            run.summary = update.summary.clone();
        }
        if update.error.is_some() {
            run.error = update.error.clone();
        }
        run.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn list_recent(&self, tenant_id: &str, limit: i64) -> Result<Vec<Run>, RepositoryError> {
        let runs = self.runs.lock().unwrap();
        let mut out: Vec<Run> = runs
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit as usize);
        Ok(out)
    }
}

/// Audit sink that records entries for assertions.
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

/// Verifier that accepts a fixed signature value.
pub struct StaticVerifier {
    accepted: &'static str,
}

impl StaticVerifier {
    pub fn accepting(accepted: &'static str) -> Self {
        Self { accepted }
    }
}

impl SignatureVerifier for StaticVerifier {
    fn verify(
        &self,
        _timestamp: Option<&str>,
        _raw_body: &[u8],
        signature: &str,
    ) -> Result<(), SignatureError> {
        if signature == self.accepted {
            Ok(())
        } else {
            Err(SignatureError::Rejected)
        }
    }
}

/// What a scripted executor does on one dispatch attempt.
pub enum ScriptedResponse {
    Accept,
    Fail(DispatchError),
    /// Never resolves; exercised with paused-time timeouts.
    Hang,
}

/// Executor client driven by a script of per-attempt responses.
/// Once the script is exhausted, every further attempt is accepted.
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<ScriptedResponse>>,
    calls: AtomicU32,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_accepting() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExecutorClient for ScriptedExecutor {
    async fn dispatch(&self, _request: &DispatchRequest) -> Result<ExecutorAck, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            None | Some(ScriptedResponse::Accept) => Ok(ExecutorAck {
                accepted_at: chrono::Utc::now(),
                executor_ref: None,
            }),
            Some(ScriptedResponse::Fail(err)) => Err(err),
            Some(ScriptedResponse::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
