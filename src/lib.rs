//! clusterfs: a clustered file-storage engine. A registry of "which nodes
//! hold which paths" is kept in two tiers (ephemeral cache + durable
//! store); file sessions pull missing content from peers over HTTP and
//! replicate written content to enough peers to meet the redundancy
//! target.

pub mod api;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod session;
pub mod transfer;
pub mod utils;
