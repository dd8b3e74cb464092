//! Policy schema types

use crate::error::ValidationError;
use crate::services::{self, Service};
use indexmap::IndexSet;
use std::fmt;
use std::str::FromStr;

/// Validated egress policy: `{services: [...], domains: [...]}`
///
/// Both sets keep declaration order. The first entries drive verification
/// target selection in the firewall and the order of audit records in the
/// proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    pub services: IndexSet<String>,
    pub domains: IndexSet<DomainPattern>,
}

impl Policy {
    /// Build a policy from raw entries, validating every domain
    pub fn from_parts<S, D>(services: S, domains: D) -> Result<Self, ValidationError>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().parse::<DomainPattern>())
            .collect::<Result<IndexSet<_>, _>>()?;

        Ok(Self {
            services: services.into_iter().map(Into::into).collect(),
            domains,
        })
    }

    /// Split declared service names into table entries and unknown names
    pub fn resolve_services(&self) -> (Vec<&'static Service>, Vec<&str>) {
        let mut known = Vec::new();
        let mut unknown = Vec::new();

        for name in &self.services {
            match services::lookup(name) {
                Some(service) => known.push(service),
                None => unknown.push(name.as_str()),
            }
        }

        (known, unknown)
    }

    /// Domain patterns naming a single host
    pub fn exact_domains(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().filter_map(|d| match d {
            DomainPattern::Exact(host) => Some(host.as_str()),
            DomainPattern::Wildcard(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.domains.is_empty()
    }
}

/// Either an exact hostname or `*.suffix`
///
/// A wildcard matches the suffix itself and any subdomain of it on a full
/// label boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DomainPattern {
    Exact(String),
    /// Suffix without the leading `*.`
    Wildcard(String),
}

impl DomainPattern {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, DomainPattern::Wildcard(_))
    }

    /// The hostname or suffix this pattern is anchored on
    pub fn host(&self) -> &str {
        match self {
            DomainPattern::Exact(host) | DomainPattern::Wildcard(host) => host,
        }
    }
}

impl FromStr for DomainPattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyDomain);
        }

        let invalid = || ValidationError::InvalidPattern {
            pattern: s.to_string(),
        };

        let lowered = trimmed.to_ascii_lowercase();
        let (wildcard, host) = match lowered.strip_prefix("*.") {
            Some(suffix) => (true, suffix),
            None => (false, lowered.as_str()),
        };

        if host.is_empty()
            || host.contains(&['*', '?'][..])
            || host.starts_with('.')
            || host.ends_with('.')
            || host.contains("..")
            || host.chars().any(|c| c.is_whitespace() || c.is_control() || c == '/')
        {
            return Err(invalid());
        }

        let host = host.to_string();
        Ok(if wildcard {
            DomainPattern::Wildcard(host)
        } else {
            DomainPattern::Exact(host)
        })
    }
}

impl fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainPattern::Exact(host) => write!(f, "{}", host),
            DomainPattern::Wildcard(suffix) => write!(f, "*.{}", suffix),
        }
    }
}

/// Proxy operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyMode {
    /// Allow all traffic, log every decision
    #[default]
    Permissive,
    /// Block anything not on the allowlist
    Enforcing,
}

impl FromStr for ProxyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log" | "permissive" => Ok(ProxyMode::Permissive),
            "enforce" | "enforcing" => Ok(ProxyMode::Enforcing),
            other => Err(format!(
                "Unknown proxy mode '{}'. Use 'enforce' or 'log'.",
                other
            )),
        }
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyMode::Permissive => write!(f, "log"),
            ProxyMode::Enforcing => write!(f, "enforce"),
        }
    }
}
