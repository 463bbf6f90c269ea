use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::{
    Record, Result, StoreError, Version,
    store::{Store, Transaction},
};

type RowKey = (String, Uuid);

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory store for tests and local runs.
///
/// Provides the same isolation as the PostgreSQL implementation: buffered
/// writes, read-committed reads, row locks held until commit, and version
/// checks on every write.
#[derive(Clone)]
pub struct InMemoryStore {
    rows: Arc<RwLock<HashMap<RowKey, Record>>>,
    locks: Arc<Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            rows: Arc::default(),
            locks: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long `get_for_update` waits before failing with `LockTimeout`.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Returns the number of committed rows of the given kind.
    pub async fn count(&self, kind: &str) -> usize {
        self.rows
            .read()
            .await
            .keys()
            .filter(|(k, _)| k == kind)
            .count()
    }

    /// Returns every committed row of the given kind.
    pub async fn rows(&self, kind: &str) -> Vec<Record> {
        self.rows
            .read()
            .await
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    fn row_lock(&self, key: &RowKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drops lock entries nobody holds or waits on.
    fn release_locks(&self, keys: &HashSet<RowKey>) {
        if keys.is_empty() {
            return;
        }
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for key in keys {
            // Holders and waiters each keep a handle besides the map's.
            if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(key);
            }
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(InMemoryTransaction {
            store: self.clone(),
            writes: HashMap::new(),
            held: HashSet::new(),
            guards: Vec::new(),
        })
    }
}

struct BufferedWrite {
    /// Committed version the first write in this transaction was based on.
    base: Version,
    record: Record,
}

/// A unit of work over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    store: InMemoryStore,
    writes: HashMap<RowKey, BufferedWrite>,
    held: HashSet<RowKey>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl InMemoryTransaction {
    async fn committed(&self, key: &RowKey) -> Option<Record> {
        self.store.rows.read().await.get(key).cloned()
    }

    fn buffered(&self, key: &RowKey) -> Option<Record> {
        self.writes.get(key).map(|w| w.record.clone())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        self.guards.clear();
        self.store.release_locks(&self.held);
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn get(&mut self, kind: &str, id: Uuid) -> Result<Option<Record>> {
        let key = (kind.to_string(), id);
        if let Some(record) = self.buffered(&key) {
            return Ok(Some(record));
        }
        Ok(self.committed(&key).await)
    }

    async fn get_for_update(&mut self, kind: &str, id: Uuid) -> Result<Option<Record>> {
        let key = (kind.to_string(), id);

        if !self.held.contains(&key) {
            let lock = self.store.row_lock(&key);
            let guard = tokio::time::timeout(self.store.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| StoreError::LockTimeout {
                    kind: kind.to_string(),
                    id,
                })?;
            self.guards.push(guard);
            self.held.insert(key.clone());
        }

        self.get(kind, id).await
    }

    async fn find_by(
        &mut self,
        kind: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<Vec<Record>> {
        let mut matches: HashMap<Uuid, Record> = self
            .store
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.kind == kind && r.field_equals(field, &value))
            .map(|r| (r.id, r.clone()))
            .collect();

        // Own writes win over committed state.
        for ((k, id), write) in &self.writes {
            if k != kind {
                continue;
            }
            if write.record.field_equals(field, &value) {
                matches.insert(*id, write.record.clone());
            } else {
                matches.remove(id);
            }
        }

        let mut records: Vec<Record> = matches.into_values().collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    async fn put(&mut self, mut record: Record) -> Result<Version> {
        let key = (record.kind.clone(), record.id);
        let expected = record.version;

        let (base, current) = match self.writes.get(&key) {
            Some(write) => (write.base, write.record.version),
            None => {
                let committed = self
                    .committed(&key)
                    .await
                    .map(|r| r.version)
                    .unwrap_or(Version::initial());
                (committed, committed)
            }
        };

        if current != expected {
            return Err(StoreError::ConcurrencyConflict {
                kind: record.kind,
                id: record.id,
                expected,
                actual: current,
            });
        }

        let new_version = expected.next();
        record.version = new_version;
        record.updated_at = Utc::now();
        self.writes.insert(key, BufferedWrite { base, record });

        Ok(new_version)
    }

    async fn commit(mut self) -> Result<()> {
        let writes = std::mem::take(&mut self.writes);
        let mut rows = self.store.rows.write().await;

        // Validate everything before applying anything.
        for (key, write) in &writes {
            let actual = rows
                .get(key)
                .map(|r| r.version)
                .unwrap_or(Version::initial());
            if actual != write.base {
                metrics::counter!("store_commit_conflicts_total").increment(1);
                return Err(StoreError::ConcurrencyConflict {
                    kind: key.0.clone(),
                    id: key.1,
                    expected: write.base,
                    actual,
                });
            }
        }

        let written = writes.len();
        for (key, write) in writes {
            rows.insert(key, write.record);
        }
        drop(rows);

        tracing::trace!(rows = written, "in-memory transaction committed");
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        tracing::trace!(
            discarded = self.writes.len(),
            "in-memory transaction rolled back"
        );
        Ok(())
    }
}
