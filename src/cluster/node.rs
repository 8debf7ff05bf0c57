//! Cluster membership: node descriptors, the node pool and the peer
//! selection strategies used for pulls and replication pushes.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::ClusterError;

type Result<T> = std::result::Result<T, ClusterError>;

const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(10);

/// One member of the storage cluster. Immutable once added to the pool.
#[derive(Clone, Debug)]
pub struct NodeDescriptor {
    pub identity: String,
    pub port: u16,
    pub endpoint: String,
    pub base_path: PathBuf,
    pub timeout: Duration,
    pub weight: u32,
}

impl NodeDescriptor {
    pub fn new(
        identity: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
        base_path: impl Into<PathBuf>,
    ) -> Self {
        NodeDescriptor {
            identity: identity.into(),
            port,
            endpoint: endpoint.into(),
            base_path: base_path.into(),
            timeout: DEFAULT_PEER_TIMEOUT,
            weight: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Inter-node transport scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// Minimum number of nodes (including the local one) that should hold a
/// copy after a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Redundancy {
    /// Every node in the pool.
    All,
    /// A fixed target, >= 1.
    Count(u32),
}

/// Injectable selection strategy so tests can replace randomness with a
/// deterministic pick.
pub trait SelectionStrategy: Send + Sync {
    /// Pick one index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

/// Uniform random selection, the production strategy.
pub struct RandomSelection;

impl SelectionStrategy for RandomSelection {
    fn pick(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// The cluster member list plus the local node's own identity. Populated at
/// startup and read-only afterwards.
pub struct NodePool {
    nodes: Vec<NodeDescriptor>,
    local: String,
    scheme: Scheme,
    redundancy: Redundancy,
    strategy: Arc<dyn SelectionStrategy>,
}

impl NodePool {
    pub fn new(
        local: impl Into<String>,
        scheme: Scheme,
        redundancy: Redundancy,
        strategy: Arc<dyn SelectionStrategy>,
    ) -> Self {
        NodePool {
            nodes: Vec::new(),
            local: local.into(),
            scheme,
            redundancy,
            strategy,
        }
    }

    /// Append a node to the pool. Duplicate entries are a caller error and
    /// are not rejected here.
    pub fn add_node(&mut self, descriptor: NodeDescriptor) {
        self.nodes.push(descriptor);
    }

    pub fn local_identity(&self) -> &str {
        &self.local
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn descriptor(&self, identity: &str) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|n| n.identity == identity)
    }

    /// The effective replica target for a flush: pool size when redundancy
    /// is `All`, otherwise the configured count capped by the pool size.
    pub fn replica_goal(&self) -> usize {
        match self.redundancy {
            Redundancy::All => self.len(),
            Redundancy::Count(n) => (n as usize).min(self.len()),
        }
    }

    /// Choose one identity from `candidates` to pull content from.
    /// Candidates not present in the pool cannot be dialed and are skipped.
    pub fn select_peer(&self, path: &str, candidates: &[String]) -> Result<String> {
        let known: Vec<&String> = candidates
            .iter()
            .filter(|c| self.descriptor(c).is_some())
            .collect();
        if known.is_empty() {
            return Err(ClusterError::SourceUnavailable(path.to_string()));
        }
        Ok(known[self.strategy.pick(known.len())].clone())
    }

    /// Choose up to `count` distinct identities to push to, excluding any
    /// in `exclude`. Best-effort: when fewer nodes are eligible, all of
    /// them are returned.
    pub fn select_push_targets(&self, exclude: &[&str], count: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut eligible: Vec<String> = Vec::new();
        for node in &self.nodes {
            if exclude.contains(&node.identity.as_str()) {
                continue;
            }
            if seen.insert(node.identity.clone()) {
                eligible.push(node.identity.clone());
            }
        }
        if eligible.len() <= count {
            return eligible;
        }
        let mut picked = Vec::with_capacity(count);
        while picked.len() < count {
            let idx = self.strategy.pick(eligible.len());
            picked.push(eligible.swap_remove(idx));
        }
        picked
    }
}
