use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid path `{0}`")]
    InvalidPath(String),

    #[error("`{0}` not found")]
    NotFound(String),

    /// No peer is available to pull the requested path from.
    #[error("no source node available for `{0}`")]
    SourceUnavailable(String),

    /// A pull connection failed or was interrupted; the partially written
    /// local file must not be exposed as valid content.
    #[error("peer `{node}` unreachable for `{path}`: {reason}")]
    PeerUnreachable {
        node: String,
        path: String,
        reason: String,
    },

    /// A stale local file blocking a fresh pull/create could not be removed.
    #[error("cannot remove stale local copy of `{0}`")]
    CannotCleanStale(String),

    #[error("session for `{0}` is already closed")]
    SessionClosed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry store error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("registry document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl IntoResponse for ClusterError {
    fn into_response(self) -> Response {
        tracing::error!("generating response for ClusterError: {:?}", self);

        let status_code = match &self {
            Self::NotFound(_) | Self::SourceUnavailable(_) => StatusCode::NOT_FOUND,
            Self::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Self::PeerUnreachable { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status_code, body).into_response()
    }
}
