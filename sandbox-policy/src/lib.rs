//! Egress policy model shared by the firewall and the filtering proxy
//!
//! Both enforcement layers load the same policy document and expand service
//! names through the same static table in [`services`], so the IP layer and
//! the HTTP layer agree on intent without any runtime coupling.

pub mod audit;
pub mod config;
pub mod error;
pub mod filter;
pub mod services;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use audit::{Action, AuditEvent, AuditLog, Verbosity};
pub use config::{DomainPattern, Policy, PolicyLoader, ProxyMode};
pub use error::{PolicyError, Result, ValidationError};
pub use filter::{HostMatcher, PolicyEngine};
pub use services::{RangeRegistry, Service, SERVICES};
