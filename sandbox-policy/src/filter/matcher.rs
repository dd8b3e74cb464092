//! Host matching logic

use crate::config::DomainPattern;
use std::collections::HashSet;
use wildmatch::WildMatch;

/// Allow table for hostnames: exact names plus wildcard suffixes
///
/// Built once and read-only afterwards, so it can be shared across
/// connection tasks without locking.
#[derive(Debug, Clone, Default)]
pub struct HostMatcher {
    exact: HashSet<String>,
    wildcards: Vec<Wildcard>,
}

/// `*.suffix`: the suffix itself, or anything below it on a label boundary
#[derive(Debug, Clone)]
struct Wildcard {
    suffix: String,
    subdomains: WildMatch,
}

impl Wildcard {
    fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            subdomains: WildMatch::new(&format!("*.{}", suffix)),
        }
    }

    fn matches(&self, host: &str) -> bool {
        host == self.suffix || self.subdomains.matches(host)
    }
}

impl HostMatcher {
    /// Create a new empty matcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern; returns false if it was already present
    pub fn add_pattern(&mut self, pattern: &DomainPattern) -> bool {
        match pattern {
            DomainPattern::Exact(host) => self.exact.insert(host.clone()),
            DomainPattern::Wildcard(suffix) => {
                if self.wildcards.iter().any(|w| &w.suffix == suffix) {
                    false
                } else {
                    self.wildcards.push(Wildcard::new(suffix));
                    true
                }
            }
        }
    }

    /// Check if a hostname is allowed by any exact entry or wildcard suffix
    pub fn matches_host(&self, host: &str) -> bool {
        let host = normalize_host(host);
        if host.is_empty() || host.starts_with('.') {
            return false;
        }

        if self.exact.contains(host.as_str()) {
            return true;
        }

        self.wildcards.iter().any(|w| w.matches(&host))
    }

    pub fn exact_count(&self) -> usize {
        self.exact.len()
    }

    pub fn wildcard_count(&self) -> usize {
        self.wildcards.len()
    }
}

/// Lower-case and drop a single trailing root dot
fn normalize_host(host: &str) -> String {
    let host = host.strip_suffix('.').unwrap_or(host);
    host.to_ascii_lowercase()
}
