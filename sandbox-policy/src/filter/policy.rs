//! Policy engine for evaluating hostnames at request time

use super::matcher::HostMatcher;
use crate::audit::AuditLog;
use crate::config::{Policy, ProxyMode};
use crate::services;

/// Decides whether a hostname may be reached through the proxy
///
/// Services are expanded through the static table, then unioned with the
/// literal domains of the policy.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    matcher: HostMatcher,
    mode: ProxyMode,
}

impl PolicyEngine {
    /// An engine that allows everything and consults no table
    pub fn permissive() -> Self {
        Self {
            matcher: HostMatcher::new(),
            mode: ProxyMode::Permissive,
        }
    }

    /// Build an enforcing engine, recording each table entry in the audit log
    pub fn from_policy(policy: &Policy, audit: &AuditLog) -> Self {
        let mut matcher = HostMatcher::new();

        for name in &policy.services {
            match services::lookup(name) {
                Some(service) => {
                    for domain in service.domains {
                        match domain.parse() {
                            Ok(pattern) => {
                                audit.info(format!("Adding '{}' to allowlist", domain));
                                matcher.add_pattern(&pattern);
                            }
                            Err(e) => tracing::warn!(service = name.as_str(), "{}", e),
                        }
                    }
                }
                None => audit.info(format!("Unknown service '{}' in policy, skipping", name)),
            }
        }

        for pattern in &policy.domains {
            audit.info(format!("Adding '{}' to allowlist", pattern));
            matcher.add_pattern(pattern);
        }

        audit.info(format!(
            "Policy loaded: {} exact, {} wildcard",
            matcher.exact_count(),
            matcher.wildcard_count()
        ));

        Self {
            matcher,
            mode: ProxyMode::Enforcing,
        }
    }

    /// Check if a connection to the given host should be allowed
    pub fn is_allowed(&self, host: &str) -> bool {
        match self.mode {
            ProxyMode::Permissive => true,
            ProxyMode::Enforcing => self.matcher.matches_host(host),
        }
    }

    pub fn mode(&self) -> ProxyMode {
        self.mode
    }

    pub fn matcher(&self) -> &HostMatcher {
        &self.matcher
    }
}
