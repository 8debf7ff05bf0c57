//! Two-tier file registry: a fast ephemeral cache merged with a durable
//! store behind one manager. Reads go cache-first with store fallback;
//! mutations write the cache, and the durable copy is refreshed by an
//! explicit interval-based reconciliation policy.

pub mod cache;
pub mod record;
pub mod store;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::ClusterError;
use crate::registry::cache::RegistryCache;
use crate::registry::record::FileRecord;
use crate::registry::store::RegistryStore;

type Result<T> = std::result::Result<T, ClusterError>;

pub struct RegistryManager {
    cache: Arc<dyn RegistryCache>,
    store: Arc<dyn RegistryStore>,
    local: String,
    reconcile_interval: Duration,
    last_persist: Mutex<HashMap<String, Instant>>,
}

impl RegistryManager {
    pub fn new(
        cache: Arc<dyn RegistryCache>,
        store: Arc<dyn RegistryStore>,
        local: impl Into<String>,
        reconcile_interval: Duration,
    ) -> Self {
        RegistryManager {
            cache,
            store,
            local: local.into(),
            reconcile_interval,
            last_persist: Mutex::new(HashMap::new()),
        }
    }

    /// Who holds a valid copy of `path`. Cache first; a cache failure is
    /// downgraded to a miss and served from the durable store. A plain
    /// lookup never repopulates the cache, only `register` does.
    pub async fn lookup(&self, path: &str) -> Result<Option<FileRecord>> {
        match self.cache.get(path).await {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(path, error = %e, "registry cache read failed, falling back to store");
            }
        }
        self.store.fetch(path).await
    }

    /// Ensure the local node is listed for `path`, creating the record if
    /// none exists. Writes the ephemeral cache only; durable writes are
    /// decoupled to bound write amplification.
    ///
    /// The record is re-read first so a concurrent update made since the
    /// caller's last read is not clobbered wholesale. There is no cross-node
    /// versioning, so two nodes flushing the same path can still race.
    pub async fn register(&self, path: &str) -> Result<FileRecord> {
        let mut record = self
            .lookup(path)
            .await?
            .unwrap_or_else(|| FileRecord::new(path));
        record.nodes.insert(self.local.clone());
        record.deleted = false;
        self.cache.set(path, &record).await?;
        Ok(record)
    }

    /// Drop the ephemeral entry for `path`. The durable store is untouched.
    pub async fn unregister(&self, path: &str) -> Result<()> {
        self.cache.delete(path).await
    }

    /// Write (or, with `None`, remove) the durable row for `path`.
    pub async fn persist(&self, path: &str, record: Option<&FileRecord>) -> Result<()> {
        match record {
            Some(record) => {
                self.store.upsert(path, record).await?;
                self.mark_persisted(path);
            }
            None => {
                self.store.delete(path).await?;
                self.last_persist.lock().unwrap().remove(path);
            }
        }
        Ok(())
    }

    /// Opportunistically refresh the durable copy of `path`: persists iff
    /// more than the configured interval has elapsed since the last durable
    /// write for that path. Failures are logged, never escalated.
    pub async fn reconcile(&self, path: &str, record: &FileRecord) {
        if !self.due_for_persist(path) {
            return;
        }
        match self.store.upsert(path, record).await {
            Ok(()) => self.mark_persisted(path),
            Err(e) => tracing::warn!(path, error = %e, "durable registry reconcile failed"),
        }
    }

    pub fn local_identity(&self) -> &str {
        &self.local
    }

    fn due_for_persist(&self, path: &str) -> bool {
        let last = self.last_persist.lock().unwrap();
        last.get(path)
            .is_none_or(|t| t.elapsed() >= self.reconcile_interval)
    }

    fn mark_persisted(&self, path: &str) {
        self.last_persist
            .lock()
            .unwrap()
            .insert(path.to_string(), Instant::now());
    }
}
