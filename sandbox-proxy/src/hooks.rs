//! Per-connection decision points
//!
//! The proxy runtime calls these at CONNECT time, at request time for plain
//! HTTP, when an allowed exchange completes and when a transport error
//! occurs. Each call is a pure lookup in the read-only allow table plus an
//! audit record, so hooks may run concurrently from any number of tasks.

use sandbox_policy::{AuditEvent, AuditLog, PolicyEngine, ProxyMode};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const UNKNOWN: &str = "unknown";

/// Outcome of a decision hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Answer 403 with this body and do not contact the origin
    Block(String),
}

pub fn block_message(host: &str) -> String {
    format!("Blocked by proxy policy: {}", host)
}

#[derive(Debug)]
pub struct Enforcer {
    engine: PolicyEngine,
    audit: Arc<AuditLog>,
}

impl Enforcer {
    pub fn new(engine: PolicyEngine, audit: Arc<AuditLog>) -> Self {
        Self { engine, audit }
    }

    pub fn mode(&self) -> ProxyMode {
        self.engine.mode()
    }

    /// Decide an HTTPS tunnel from the requested host alone
    pub fn on_connect(&self, host: &str) -> Verdict {
        if self.engine.is_allowed(host) {
            debug!("CONNECT to {} allowed", host);
            return Verdict::Allow;
        }

        self.audit.decision(AuditEvent::blocked(None, host, None));
        Verdict::Block(block_message(host))
    }

    /// Decide a plaintext HTTP request
    pub fn on_request(&self, method: &str, host: &str, path: &str) -> Verdict {
        if self.engine.is_allowed(host) {
            return Verdict::Allow;
        }

        self.audit
            .decision(AuditEvent::blocked(Some(method), host, Some(path)));
        Verdict::Block(block_message(host))
    }

    /// Record an allowed exchange that produced a response
    pub fn on_response(&self, method: &str, host: &str, path: &str, status: u16) {
        self.audit
            .decision(AuditEvent::allowed(method, host, path, status));
    }

    /// Record a transport failure; fields not known yet are logged as "unknown"
    pub fn on_error(&self, host: Option<&str>, path: Option<&str>, error: &dyn fmt::Display) {
        let message = error.to_string();
        self.audit.decision(AuditEvent::error(
            host.unwrap_or(UNKNOWN),
            path.unwrap_or(UNKNOWN),
            if message.is_empty() { UNKNOWN } else { &message },
        ));
    }
}
