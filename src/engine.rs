//! The explicitly constructed engine context: node pool, registry manager,
//! peer transfer and the rooted local base path. Built once at startup and
//! shared behind an `Arc`, so several independently configured engines can
//! coexist in one process.

use std::path::{Path, PathBuf};

use crate::cluster::node::NodePool;
use crate::error::ClusterError;
use crate::registry::RegistryManager;
use crate::transfer::PeerTransfer;

type Result<T> = std::result::Result<T, ClusterError>;

pub struct Engine {
    pool: NodePool,
    registry: RegistryManager,
    transfer: PeerTransfer,
    base: PathBuf,
    file_mode: u32,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("base", &self.base)
            .field("file_mode", &self.file_mode)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        pool: NodePool,
        registry: RegistryManager,
        transfer: PeerTransfer,
        base: PathBuf,
        file_mode: u32,
    ) -> Result<Self> {
        if !base.is_absolute() {
            return Err(ClusterError::Config(format!(
                "base path `{}` must be absolute",
                base.display()
            )));
        }
        if !base.is_dir() {
            return Err(ClusterError::Config(format!(
                "base path `{}` does not exist or is not a directory",
                base.display()
            )));
        }
        if pool.descriptor(pool.local_identity()).is_none() {
            return Err(ClusterError::Config(format!(
                "local identity `{}` is not a member of the node pool",
                pool.local_identity()
            )));
        }
        Ok(Engine {
            pool,
            registry,
            transfer,
            base,
            file_mode,
        })
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    pub fn registry(&self) -> &RegistryManager {
        &self.registry
    }

    pub fn transfer(&self) -> &PeerTransfer {
        &self.transfer
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn file_mode(&self) -> u32 {
        self.file_mode
    }

    /// Apply the configured permission mode to a freshly created file.
    /// Best-effort on platforms without unix permissions.
    pub(crate) async fn apply_file_mode(&self, path: &Path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(self.file_mode);
            if let Err(e) = tokio::fs::set_permissions(path, permissions).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to apply file mode");
            }
        }
        #[cfg(not(unix))]
        let _ = path;
    }
}
