//! Error types for proxy operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid proxy request: {0}")]
    InvalidRequest(String),

    #[error("Failed to connect to upstream '{addr}': {source}")]
    UpstreamConnect {
        addr: String,
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
