//! Error types for trade-history

use thiserror::Error;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the ledger source, providers and the store.
///
/// Metadata and price lookups never let these escape to callers of the
/// enrichment pipeline; they are logged and degraded instead. Storage errors
/// always propagate.
#[derive(Error, Debug)]
pub enum Error {
    /// JSON-RPC failure from the ledger node (transport status or RPC error object)
    #[error("RPC error: {message}")]
    Rpc { status: Option<u16>, message: String },

    /// Metadata or price provider returned something unusable
    #[error("Provider error: {0}")]
    Provider(String),

    /// Database operation error
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// HTTP transport error. The request URL is stripped because it can
    /// carry an API key.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Unexpected JSON shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.without_url())
    }
}

impl Error {
    /// Upstream HTTP status worth relaying to a caller, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Rpc { status, .. } => *status,
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            Error::InvalidInput(_) => Some(400),
            _ => None,
        }
    }
}
