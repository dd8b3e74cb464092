//! Hostname allow/deny decisions

pub mod matcher;
pub mod policy;

pub use matcher::HostMatcher;
pub use policy::PolicyEngine;
