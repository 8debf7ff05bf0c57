//! Peer content transfer: streaming HTTP pull from a single peer and
//! best-effort concurrent gzip push to a set of peers.

use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tokio::io::AsyncWriteExt;

use crate::cluster::node::{NodeDescriptor, Scheme};
use crate::error::ClusterError;

type Result<T> = std::result::Result<T, ClusterError>;

pub const PROTOCOL_VERSION: u32 = 1;

/// Aggregate result of one replication fan-out. For logging only; a push
/// shortfall never escalates to the caller.
#[derive(Clone, Copy, Debug)]
pub struct PushOutcome {
    pub attempted: usize,
    pub succeeded: usize,
}

pub struct PeerTransfer {
    client: reqwest::Client,
    scheme: Scheme,
}

impl PeerTransfer {
    pub fn new(scheme: Scheme) -> Self {
        PeerTransfer {
            client: reqwest::Client::new(),
            scheme,
        }
    }

    fn content_url(&self, node: &NodeDescriptor, path: &str) -> String {
        format!(
            "{}://{}:{}{}/v{}/store/{}",
            self.scheme, node.identity, node.port, node.endpoint, PROTOCOL_VERSION, path
        )
    }

    /// Stream the full content of `path` from `node` into `dest`. Any
    /// connect or mid-stream failure maps to `PeerUnreachable`; the caller
    /// must discard the partially written file.
    pub async fn pull(
        &self,
        path: &str,
        node: &NodeDescriptor,
        dest: &mut tokio::fs::File,
    ) -> Result<u64> {
        let url = self.content_url(node, path);
        let unreachable = |reason: String| ClusterError::PeerUnreachable {
            node: node.identity.clone(),
            path: path.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(&url)
            .timeout(node.timeout)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| unreachable(e.to_string()))?;

        let mut total = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| unreachable(e.to_string()))?
        {
            dest.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        tracing::debug!(path, node = %node.identity, bytes = total, "pulled content from peer");
        Ok(total)
    }

    /// Replicate `local` to every target concurrently. The content is
    /// compressed once; a brand-new file is sent with POST, an update with
    /// PUT. Individual failures are logged and counted, never raised: the
    /// write already succeeded locally and redundancy is a target, not a
    /// guarantee.
    pub async fn push(
        &self,
        path: &str,
        local: &Path,
        targets: &[NodeDescriptor],
        is_new: bool,
    ) -> Result<PushOutcome> {
        let raw = tokio::fs::read(local).await?;
        let body = tokio::task::spawn_blocking(move || gzip(&raw))
            .await
            .map_err(std::io::Error::other)??;

        let attempts = targets.iter().map(|node| {
            let url = self.content_url(node, path);
            let request = if is_new {
                self.client.post(&url)
            } else {
                self.client.put(&url)
            };
            let body = body.clone();
            async move {
                let result = request
                    .timeout(node.timeout)
                    .header(CONTENT_ENCODING, "gzip")
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(body)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());
                (node.identity.clone(), result)
            }
        });

        let settled = futures::future::join_all(attempts).await;
        let mut succeeded = 0;
        for (identity, result) in &settled {
            match result {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    tracing::warn!(path, node = %identity, error = %e, "replication push failed");
                }
            }
        }
        Ok(PushOutcome {
            attempted: settled.len(),
            succeeded,
        })
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub(crate) fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_urls_follow_the_versioned_store_layout() {
        let transfer = PeerTransfer::new(Scheme::Https);
        let node = NodeDescriptor::new("node-b.internal", 7640, "/cluster", "/srv/b");
        assert_eq!(
            transfer.content_url(&node, "a/1.bin"),
            "https://node-b.internal:7640/cluster/v1/store/a/1.bin"
        );
    }

    #[test]
    fn gunzip_rejects_garbage() {
        assert!(gunzip(b"not gzip at all").is_err());
    }

    #[test]
    fn gzip_then_gunzip_restores_content() {
        let content = b"cluster bytes".repeat(100);
        let packed = gzip(&content).unwrap();
        assert!(packed.len() < content.len());
        assert_eq!(gunzip(&packed).unwrap(), content);
    }
}
