//! Ephemeral registry tier. Fast, namespaced by a key prefix, and allowed
//! to lose data at any time; always an accelerant over the durable store,
//! never the sole source of truth.

use crate::error::ClusterError;
use crate::registry::record::FileRecord;

type Result<T> = std::result::Result<T, ClusterError>;

#[async_trait::async_trait]
pub trait RegistryCache: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<FileRecord>>;

    async fn set(&self, path: &str, record: &FileRecord) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;
}

pub struct MokaRegistryCache {
    inner: moka::future::Cache<String, FileRecord>,
    prefix: String,
}

impl MokaRegistryCache {
    pub fn new(capacity: u64, prefix: impl Into<String>) -> Self {
        MokaRegistryCache {
            inner: moka::future::Cache::new(capacity),
            prefix: prefix.into(),
        }
    }

    fn key(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

#[async_trait::async_trait]
impl RegistryCache for MokaRegistryCache {
    async fn get(&self, path: &str) -> Result<Option<FileRecord>> {
        Ok(self.inner.get(&self.key(path)).await)
    }

    async fn set(&self, path: &str, record: &FileRecord) -> Result<()> {
        self.inner.insert(self.key(path), record.clone()).await;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.invalidate(&self.key(path)).await;
        Ok(())
    }
}
