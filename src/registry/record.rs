use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The registry document for one path: which node identities are believed
/// to hold a valid copy. Membership is what matters; `BTreeSet` rules out
/// duplicate identities and keeps iteration deterministic.
///
/// A record with an empty `nodes` set means "nobody to pull from", which is
/// distinct from no record at all (a brand-new file).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub nodes: BTreeSet<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl FileRecord {
    pub fn new(path: impl Into<String>) -> Self {
        FileRecord {
            path: path.into(),
            nodes: BTreeSet::new(),
            deleted: false,
        }
    }

    pub fn holds(&self, identity: &str) -> bool {
        self.nodes.contains(identity)
    }
}
