//! Idempotency store with first-writer-wins semantics.
//!
//! Maps an idempotency key to the recorded admission outcome (run id +
//! status snapshot) with a TTL. `get_or_init` is a single atomic
//! check-and-set through the DashMap entry API, which is what guarantees
//! at-most-one admitted run per key under concurrent duplicate requests.
//!
//! Trigger keys and webhook event keys live in separate namespaces so a
//! trigger's idempotency key can never collide with an unrelated event key.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use agentry_types::run::RunStatus;

/// Keyspace for idempotency records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Trigger requests (`Idempotency-Key` header).
    Trigger,
    /// Executor webhook events (`x-idempotency-key` header).
    Event,
}

/// The outcome recorded for an idempotency key.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Concurrent idempotency store.
///
/// Records are never mutated after first write within their TTL, except to
/// append the run's terminal status via [`IdempotencyStore::finalize_run`]
/// so late duplicate polls see the final outcome instead of the initial
/// "queued" snapshot.
pub struct IdempotencyStore {
    entries: DashMap<(Namespace, String), IdempotencyRecord>,
    /// Reverse index from run id to its trigger key, for finalization.
    trigger_keys: DashMap<Uuid, String>,
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            trigger_keys: DashMap::new(),
        }
    }

    /// Atomically return the recorded value for `key`, or store the value
    /// produced by `producer` if the key is unseen or expired.
    ///
    /// Returns `(record, was_first)`. The producer runs under the entry
    /// lock, so exactly one concurrent caller per key observes
    /// `was_first == true`.
    pub fn get_or_init<F>(
        &self,
        namespace: Namespace,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> (IdempotencyRecord, bool)
    where
        F: FnOnce() -> (Uuid, RunStatus),
    {
        let now = Utc::now();
        let make = |now: DateTime<Utc>| {
            let (run_id, status) = producer();
            IdempotencyRecord {
                run_id,
                status,
                expires_at: now + ttl,
            }
        };

        let (record, was_first) = match self.entries.entry((namespace, key.to_string())) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    let record = make(now);
                    occupied.insert(record.clone());
                    (record, true)
                } else {
                    (occupied.get().clone(), false)
                }
            }
            Entry::Vacant(vacant) => {
                let record = make(now);
                vacant.insert(record.clone());
                (record, true)
            }
        };

        if was_first && namespace == Namespace::Trigger {
            self.trigger_keys.insert(record.run_id, key.to_string());
        }

        (record, was_first)
    }

    /// Non-mutating lookup. Expired entries are evicted and read as absent.
    pub fn seen(&self, namespace: Namespace, key: &str) -> Option<IdempotencyRecord> {
        let now = Utc::now();
        let composite = (namespace, key.to_string());
        if let Some(record) = self.entries.get(&composite) {
            if !record.is_expired(now) {
                return Some(record.clone());
            }
        }
        // Lazy eviction of the expired entry
        self.entries
            .remove_if(&composite, |_, record| record.is_expired(now));
        None
    }

    /// Unconditionally record a key. Used by the webhook ingestor, which
    /// marks an event key seen only AFTER the state mutation commits.
    pub fn mark(
        &self,
        namespace: Namespace,
        key: &str,
        run_id: Uuid,
        status: RunStatus,
        ttl: Duration,
    ) {
        self.entries.insert(
            (namespace, key.to_string()),
            IdempotencyRecord {
                run_id,
                status,
                expires_at: Utc::now() + ttl,
            },
        );
    }

    /// Append a run's terminal status to its trigger record, if still live.
    ///
    /// Returns false when the record has already expired or was never there.
    pub fn finalize_run(&self, run_id: Uuid, status: RunStatus) -> bool {
        let Some(key) = self.trigger_keys.get(&run_id).map(|k| k.value().clone()) else {
            return false;
        };
        let now = Utc::now();
        match self.entries.entry((Namespace::Trigger, key)) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                occupied.get_mut().status = status;
                true
            }
            _ => false,
        }
    }

    /// Evict all expired entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, record| !record.is_expired(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "idempotency sweep evicted expired entries");
        }
        self.trigger_keys
            .retain(|run_id, _| self.entries.iter().any(|e| e.value().run_id == *run_id));
        removed
    }

    /// Number of live entries (including not-yet-evicted expired ones).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}
