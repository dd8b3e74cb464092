//! Error types for policy loading

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PolicyError>;

/// A policy that fails any of these checks is never partially applied.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("Failed to read policy from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid policy document {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid policy schema in {}: {message}", path.display())]
    Schema { path: PathBuf, message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Domain entries must be non-empty strings")]
    EmptyDomain,

    #[error("Invalid domain pattern: {pattern}")]
    InvalidPattern { pattern: String },
}
