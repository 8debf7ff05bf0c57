use std::path::PathBuf;
use std::time::Duration;

use crate::cluster::node::{NodeDescriptor, Redundancy, Scheme};

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub identity: String,
    pub root: PathBuf,
    pub db_url: String,
    pub cache_prefix: String,
    pub cache_capacity: u64,
    pub redundancy: Redundancy,
    pub scheme: Scheme,
    pub peers: Vec<NodeDescriptor>,
    pub reconcile_interval: Duration,
    pub file_mode: u32,
}
