//! Error types for the HTTP and WebSocket servers.

use std::path::PathBuf;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Startup error.
///
/// Anything that prevents the server from starting. Runtime failures of a
/// single request or connection are handled locally and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Listener could not be bound (e.g. port already in use).
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested `host:port`.
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Served directory could not be resolved.
    #[error("Cannot serve directory {}: {source}", .path.display())]
    Directory {
        /// Directory as configured.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Filesystem watcher could not be started.
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-request error of the content server.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ContentError {
    /// Nothing to serve at the requested path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request resolves outside the served directory.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request path is not valid UTF-8 after percent-decoding.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Only GET and HEAD are served.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// File exists but could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContentError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ContentError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Self::Io(e) => tracing::error!(error = %e, "Failed to read file"),
            Self::Forbidden(path) => tracing::warn!(path = %path, "Rejected path outside served directory"),
            _ => tracing::debug!(error = %self, "Request failed"),
        }

        // Body carries only the status line, never the requested path or file content.
        let body = format!(
            "{} {}\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        );

        if matches!(self, Self::MethodNotAllowed) {
            return (status, [(header::ALLOW, "GET, HEAD")], body).into_response();
        }
        (status, body).into_response()
    }
}
