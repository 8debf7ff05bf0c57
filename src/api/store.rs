//! Inter-node content endpoint. Every pool node serves its local copies to
//! every other node here: GET streams content out for pulls, POST (create)
//! and PUT (update) ingest gzip-compressed replication pushes.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use axum::http::{HeaderMap, Response, StatusCode, header};
use axum::response::IntoResponse;
use tokio_util::io::ReaderStream;

use crate::error::ClusterError;
use crate::transfer::gunzip;
use crate::utils::state::AppState;
use crate::utils::validation::is_clean_path;

/// GET /v1/store/<path>
pub async fn get_store_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ClusterError> {
    if !is_clean_path(&path) {
        return Err(ClusterError::InvalidPath(path));
    }

    let abs = state.engine.base().join(&path);
    let file = tokio::fs::File::open(&abs).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ClusterError::NotFound(path.clone()),
        _ => ClusterError::Io(e),
    })?;
    let content_length = file.metadata().await?.len();
    let body = Body::from_stream(ReaderStream::new(file));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_LENGTH, content_length)
        .body(body)
        .unwrap())
}

/// POST /v1/store/<path> — create-semantics push from a peer.
pub async fn post_store_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ClusterError> {
    ingest(state, path, headers, body).await?;
    Ok(StatusCode::CREATED)
}

/// PUT /v1/store/<path> — update-semantics push from a peer.
pub async fn put_store_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ClusterError> {
    ingest(state, path, headers, body).await?;
    Ok(StatusCode::OK)
}

async fn ingest(
    state: Arc<AppState>,
    path: String,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(), ClusterError> {
    if !is_clean_path(&path) {
        return Err(ClusterError::InvalidPath(path));
    }

    let gzipped = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
    let content = if gzipped {
        tokio::task::spawn_blocking(move || gunzip(&body))
            .await
            .map_err(std::io::Error::other)??
    } else {
        body.to_vec()
    };

    let abs = state.engine.base().join(&path);
    if let Some(parent) = abs.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&abs, &content).await?;
    state.engine.apply_file_mode(&abs).await;

    // This node now holds a valid replica and can serve pulls for it.
    let record = state.engine.registry().register(&path).await?;
    state.engine.registry().reconcile(&path, &record).await;

    tracing::debug!(path, bytes = content.len(), "ingested replica from peer");
    Ok(())
}
