//! Durable registry tier: one row per path holding the serialized registry
//! document. Written opportunistically, read on cache misses.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::error::ClusterError;
use crate::registry::record::FileRecord;

type Result<T> = std::result::Result<T, ClusterError>;

#[async_trait::async_trait]
pub trait RegistryStore: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Option<FileRecord>>;

    async fn upsert(&self, path: &str, record: &FileRecord) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;
}

#[derive(Debug)]
pub struct SqliteRegistryStore {
    pool: Arc<SqlitePool>,
}

impl SqliteRegistryStore {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        SqliteRegistryStore { pool }
    }

    pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS files (path TEXT PRIMARY KEY, record TEXT NOT NULL)")
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RegistryStore for SqliteRegistryStore {
    async fn fetch(&self, path: &str) -> Result<Option<FileRecord>> {
        let document: Option<String> =
            sqlx::query_scalar("SELECT record FROM files WHERE path = $1")
                .bind(path)
                .fetch_optional(self.pool.as_ref())
                .await?;
        match document {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, path: &str, record: &FileRecord) -> Result<()> {
        let document = serde_json::to_string(record)?;
        sqlx::query(
            "INSERT INTO files (path, record) VALUES ($1, $2) \
             ON CONFLICT(path) DO UPDATE SET record = excluded.record",
        )
        .bind(path)
        .bind(document)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE path = $1")
            .bind(path)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}
