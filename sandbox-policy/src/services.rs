//! Static service table
//!
//! Maps a service name to the domain patterns it needs. The proxy expands
//! services through `domains`; the firewall cannot resolve wildcards, so for
//! services that publish their address space it fetches `ranges` instead.
//! Neither layer mutates this table.

/// A published registry of IPv4/IPv6 ranges for one service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRegistry {
    /// Metadata document, a JSON object keyed by traffic class
    pub url: &'static str,
    /// Traffic classes whose ranges are allowed
    pub keys: &'static [&'static str],
    /// Endpoint expected to be reachable once the ranges are allowed
    pub probe_url: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Service {
    pub name: &'static str,
    pub domains: &'static [&'static str],
    pub ranges: Option<RangeRegistry>,
}

pub const GITHUB_META: RangeRegistry = RangeRegistry {
    url: "https://api.github.com/meta",
    keys: &["web", "api", "git"],
    probe_url: "https://api.github.com/zen",
};

pub const SERVICES: &[Service] = &[
    Service {
        name: "github",
        domains: &[
            "github.com",
            "*.github.com",
            "githubusercontent.com",
            "*.githubusercontent.com",
        ],
        ranges: Some(GITHUB_META),
    },
    Service {
        name: "claude",
        domains: &[
            "*.anthropic.com",
            "*.claude.ai",
            "*.claude.com",
            "*.sentry.io",
            "*.datadoghq.com",
        ],
        ranges: None,
    },
    Service {
        name: "copilot",
        domains: &[
            "github.com",
            "api.github.com",
            "copilot-telemetry.githubusercontent.com",
            "collector.github.com",
            "default.exp-tas.com",
            "copilot-proxy.githubusercontent.com",
            "origin-tracker.githubusercontent.com",
            "*.githubcopilot.com",
            "*.individual.githubcopilot.com",
            "*.business.githubcopilot.com",
            "*.enterprise.githubcopilot.com",
            "*.githubassets.com",
        ],
        ranges: None,
    },
    Service {
        name: "vscode",
        domains: &[
            "update.code.visualstudio.com",
            "marketplace.visualstudio.com",
            "mobile.events.data.microsoft.com",
            "main.vscode-cdn.net",
            "*.vsassets.io",
        ],
        ranges: None,
    },
    Service {
        name: "jetbrains",
        domains: &[
            "plugins.jetbrains.com",
            "downloads.marketplace.jetbrains.com",
        ],
        ranges: None,
    },
];

/// Look up a service by exact name
pub fn lookup(name: &str) -> Option<&'static Service> {
    SERVICES.iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainPattern;
    use crate::filter::HostMatcher;
    use std::collections::HashSet;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("github").map(|s| s.name), Some("github"));
        assert!(lookup("GitHub").is_none());
        assert!(lookup("gitlab").is_none());
    }

    #[test]
    fn test_names_unique() {
        let unique: HashSet<_> = SERVICES.iter().map(|s| s.name).collect();
        assert_eq!(unique.len(), SERVICES.len());
    }

    #[test]
    fn test_every_pattern_parses() {
        for service in SERVICES {
            for domain in service.domains {
                assert!(
                    domain.parse::<DomainPattern>().is_ok(),
                    "{} in service {}",
                    domain,
                    service.name
                );
            }
        }
    }

    #[test]
    fn test_probe_hosts_allowed_by_own_patterns() {
        // The firewall verifies range-published services against probe_url;
        // the proxy must allow the same host for the same service.
        for service in SERVICES {
            let Some(registry) = service.ranges else { continue };
            let mut matcher = HostMatcher::new();
            for domain in service.domains {
                matcher.add_pattern(&domain.parse().unwrap());
            }

            let host = registry
                .probe_url
                .trim_start_matches("https://")
                .split('/')
                .next()
                .unwrap();
            assert!(matcher.matches_host(host), "{} not allowed for {}", host, service.name);
        }
    }
}
