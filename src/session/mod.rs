//! Per-open-handle state machine. A session owns exactly one local file
//! handle; opening resolves the registry (pulling from a peer when the
//! local node lacks the content), and closing a modified session resets
//! the registry to the local node and replicates to enough peers to meet
//! the redundancy target.

use std::collections::BTreeSet;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::engine::Engine;
use crate::error::ClusterError;
use crate::utils::validation::is_clean_path;

type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    /// Freshly created, no prior registry record.
    New,
    /// Existing content opened, unmodified so far.
    Open,
    /// Content modified since open.
    Updated,
    /// Terminal.
    Closed,
}

/// Local file metadata augmented with the registry's node set.
#[derive(Clone, Debug)]
pub struct FileStat {
    pub path: String,
    pub len: u64,
    pub modified: Option<SystemTime>,
    pub nodes: BTreeSet<String>,
}

pub struct FileSession {
    engine: Arc<Engine>,
    path: String,
    abs: PathBuf,
    file: Option<tokio::fs::File>,
    status: SessionStatus,
}

impl std::fmt::Debug for FileSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSession")
            .field("path", &self.path)
            .field("abs", &self.abs)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl FileSession {
    pub async fn open(engine: Arc<Engine>, path: &str, mode: OpenMode) -> Result<FileSession> {
        if !is_clean_path(path) {
            return Err(ClusterError::InvalidPath(path.to_string()));
        }
        let abs = engine.base().join(path);
        let local = engine.pool().local_identity().to_string();

        // A tombstoned record behaves like no record at all.
        let record = engine
            .registry()
            .lookup(path)
            .await?
            .filter(|r| !r.deleted);
        let locally_available = match &record {
            Some(r) => r.holds(&local) && tokio::fs::try_exists(&abs).await.unwrap_or(false),
            None => false,
        };

        let (file, status, known) = match record {
            None => {
                if mode == OpenMode::Read {
                    return Err(ClusterError::NotFound(path.to_string()));
                }
                remove_stale(&abs, path).await?;
                create_parents(&abs).await?;
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&abs)
                    .await?;
                engine.apply_file_mode(&abs).await;
                (file, SessionStatus::New, None)
            }
            Some(record) if locally_available => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(mode == OpenMode::Write)
                    .open(&abs)
                    .await?;
                (file, SessionStatus::Open, Some(record))
            }
            Some(record) => {
                // Local node is not listed, or is listed but the file went
                // missing. Either way the content must be fetched; pulling
                // from ourselves cannot succeed, so the local identity is
                // dropped from the candidates.
                let candidates: Vec<String> = record
                    .nodes
                    .iter()
                    .filter(|n| **n != local)
                    .cloned()
                    .collect();
                let peer = engine.pool().select_peer(path, &candidates)?;
                let descriptor = engine
                    .pool()
                    .descriptor(&peer)
                    .cloned()
                    .ok_or_else(|| ClusterError::SourceUnavailable(path.to_string()))?;

                remove_stale(&abs, path).await?;
                create_parents(&abs).await?;
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&abs)
                    .await?;

                if let Err(e) = engine.transfer().pull(path, &descriptor, &mut file).await {
                    // Partial content must not be exposed as valid.
                    drop(file);
                    let _ = tokio::fs::remove_file(&abs).await;
                    return Err(e);
                }
                file.flush().await?;
                file.rewind().await?;
                engine.apply_file_mode(&abs).await;
                let record = engine.registry().register(path).await?;
                (file, SessionStatus::Open, Some(record))
            }
        };

        let session = FileSession {
            engine,
            path: path.to_string(),
            abs,
            file: Some(file),
            status,
        };
        // Bound durable-store staleness on the open path.
        if let Some(record) = &known {
            session.engine.registry().reconcile(path, record).await;
        }
        Ok(session)
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.handle()?.read(buf).await?)
    }

    pub async fn read_to_end(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        Ok(self.handle()?.read_to_end(buf).await?)
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.handle()?.write_all(buf).await?;
        if self.status == SessionStatus::Open {
            self.status = SessionStatus::Updated;
        }
        Ok(buf.len())
    }

    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.handle()?.seek(pos).await?)
    }

    /// Commit local content and replicate. Only meaningful for sessions
    /// with new or modified content; a no-op otherwise.
    ///
    /// The registry entry is deliberately reset to the local node first:
    /// after a local write, the local copy is the only one known good, and
    /// any previously listed peers are stale until they re-ingest.
    pub async fn flush(&mut self) -> Result<()> {
        if !matches!(self.status, SessionStatus::New | SessionStatus::Updated) {
            return Ok(());
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ClusterError::SessionClosed(self.path.clone()))?;
        file.flush().await?;
        file.sync_all().await?;

        let registry = self.engine.registry();
        registry.unregister(&self.path).await?;
        let record = registry.register(&self.path).await?;
        // Persist the reset before peers start re-ingesting, so their
        // read-modify-write sees the fresh node set rather than the stale
        // one.
        registry.reconcile(&self.path, &record).await;

        let extra = self.engine.pool().replica_goal().saturating_sub(1);
        if extra > 0 {
            let local = self.engine.pool().local_identity().to_string();
            let targets = self
                .engine
                .pool()
                .select_push_targets(&[local.as_str()], extra);
            let descriptors: Vec<_> = targets
                .iter()
                .filter_map(|t| self.engine.pool().descriptor(t).cloned())
                .collect();
            if !descriptors.is_empty() {
                let outcome = self
                    .engine
                    .transfer()
                    .push(
                        &self.path,
                        &self.abs,
                        &descriptors,
                        self.status == SessionStatus::New,
                    )
                    .await?;
                tracing::info!(
                    path = %self.path,
                    attempted = outcome.attempted,
                    succeeded = outcome.succeeded,
                    "replicated after flush"
                );
            }
        }
        Ok(())
    }

    /// Flush pending content if needed, then release the handle. Closing
    /// an already-closed session is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.status == SessionStatus::Closed {
            return Ok(());
        }
        self.flush().await?;
        self.file = None;
        self.status = SessionStatus::Closed;
        Ok(())
    }

    fn handle(&mut self) -> Result<&mut tokio::fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| ClusterError::SessionClosed(self.path.clone()))
    }
}

impl Drop for FileSession {
    fn drop(&mut self) {
        if self.status != SessionStatus::Closed {
            tracing::warn!(
                path = %self.path,
                "session dropped without close; pending replication skipped"
            );
        }
    }
}

impl Engine {
    /// Remove `path` from both registry tiers and, best-effort, from the
    /// local disk. The registry removal is authoritative regardless of
    /// local disk state; copies on other nodes are left orphaned.
    pub async fn unlink(&self, path: &str) -> Result<()> {
        if !is_clean_path(path) {
            return Err(ClusterError::InvalidPath(path.to_string()));
        }
        self.registry().unregister(path).await?;
        self.registry().persist(path, None).await?;
        match tokio::fs::remove_file(self.base().join(path)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path, error = %e, "could not remove local copy on unlink");
            }
        }
        Ok(())
    }

    /// Local filesystem metadata augmented with the registry node set. A
    /// missing local file reports not-found regardless of registry
    /// contents.
    pub async fn stat(&self, path: &str) -> Result<FileStat> {
        if !is_clean_path(path) {
            return Err(ClusterError::InvalidPath(path.to_string()));
        }
        let meta = tokio::fs::metadata(self.base().join(path))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ClusterError::NotFound(path.to_string()),
                _ => ClusterError::Io(e),
            })?;
        let nodes = self
            .registry()
            .lookup(path)
            .await?
            .map(|r| r.nodes)
            .unwrap_or_default();
        Ok(FileStat {
            path: path.to_string(),
            len: meta.len(),
            modified: meta.modified().ok(),
            nodes,
        })
    }
}

async fn remove_stale(abs: &std::path::Path, path: &str) -> Result<()> {
    match tokio::fs::remove_file(abs).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            tracing::error!(path, error = %e, "stale local file could not be removed");
            Err(ClusterError::CannotCleanStale(path.to_string()))
        }
    }
}

async fn create_parents(abs: &std::path::Path) -> Result<()> {
    if let Some(parent) = abs.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
