//! Error types for firewall initialisation

use crate::engine::Phase;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FirewallError>;

/// Every variant is fatal. A failure after teardown leaves the packet filter
/// in whatever state the completed commands produced.
#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("Failed to resolve {domain}: {reason}")]
    Resolution { domain: String, reason: String },

    #[error("Failed to fetch {service} address ranges: {reason}")]
    Registry { service: String, reason: String },

    #[error("Command failed: {command}\n{stderr}")]
    Command { command: String, stderr: String },

    #[error("Failed to execute {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Failed to detect host network: {0}")]
    HostNetwork(String),

    #[error("Firewall verification failed - {0}")]
    Verification(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// The phase a run stopped in, with the error that stopped it
#[derive(Debug, Error)]
#[error("{phase} phase failed: {source}")]
pub struct PhaseError {
    pub phase: Phase,
    pub source: FirewallError,
}
