//! Filtering HTTP forward proxy for the sandbox container

pub mod error;
pub mod hooks;
pub mod proxy;

// Re-export commonly used types
pub use error::{ProxyError, Result};
pub use hooks::{Enforcer, Verdict};
pub use proxy::{ProxyServer, ProxyServerConfig};
