//! Domain and service address resolution
//!
//! Domains resolve to IPv4 addresses through the system resolver. Services
//! that publish their address space resolve to aggregated IPv4 CIDR blocks
//! fetched from their registry.

use crate::error::{FirewallError, Result};
use ipnet::Ipv4Net;
use sandbox_policy::RangeRegistry;
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = "agent-sandbox-firewall/1.0";
const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of addresses for the allow-set
pub trait Resolve {
    /// IPv4 addresses for a hostname; IPv6 answers are ignored
    fn resolve_domain(&self, domain: &str) -> Result<BTreeSet<Ipv4Addr>>;

    /// Aggregated IPv4 ranges published by a service
    fn fetch_service_ranges(&self, service: &str, registry: &RangeRegistry) -> Result<Vec<Ipv4Net>>;
}

/// System resolver plus an HTTPS client for range registries
pub struct SystemResolver {
    client: reqwest::blocking::Client,
}

impl SystemResolver {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REGISTRY_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl Resolve for SystemResolver {
    fn resolve_domain(&self, domain: &str) -> Result<BTreeSet<Ipv4Addr>> {
        info!("Resolving {}...", domain);

        let answers = (domain, 0u16)
            .to_socket_addrs()
            .map_err(|e| FirewallError::Resolution {
                domain: domain.to_string(),
                reason: e.to_string(),
            })?;

        validate_addresses(domain, answers.map(|a| a.ip()))
    }

    fn fetch_service_ranges(&self, service: &str, registry: &RangeRegistry) -> Result<Vec<Ipv4Net>> {
        info!("Fetching {} IP ranges from {}...", service, registry.url);

        let registry_error = |reason: String| FirewallError::Registry {
            service: service.to_string(),
            reason,
        };

        let document: Value = self
            .client
            .get(registry.url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json())
            .map_err(|e| registry_error(e.to_string()))?;

        parse_registry(service, &document, registry.keys)
    }
}

/// Keep the IPv4 answers, rejecting anything that cannot be a real host
pub fn validate_addresses<I>(domain: &str, answers: I) -> Result<BTreeSet<Ipv4Addr>>
where
    I: IntoIterator<Item = IpAddr>,
{
    let mut addresses = BTreeSet::new();

    for answer in answers {
        let IpAddr::V4(addr) = answer else {
            debug!("Ignoring IPv6 answer {} for {}", answer, domain);
            continue;
        };

        if addr.is_unspecified() || addr.is_broadcast() {
            return Err(FirewallError::Resolution {
                domain: domain.to_string(),
                reason: format!("invalid IP from DNS: {}", addr),
            });
        }
        addresses.insert(addr);
    }

    if addresses.is_empty() {
        return Err(FirewallError::Resolution {
            domain: domain.to_string(),
            reason: "no IPv4 addresses found".to_string(),
        });
    }

    Ok(addresses)
}

/// Extract, validate and aggregate the IPv4 ranges of the given traffic classes
///
/// IPv6 entries are dropped. Any other entry that is not an IPv4 CIDR fails
/// the whole fetch, since it means the registry format changed.
pub fn parse_registry(service: &str, document: &Value, keys: &[&str]) -> Result<Vec<Ipv4Net>> {
    let registry_error = |reason: String| FirewallError::Registry {
        service: service.to_string(),
        reason,
    };

    let mut networks = Vec::new();

    for key in keys {
        let entries = document
            .get(*key)
            .ok_or_else(|| registry_error(format!("response missing '{}' field", key)))?
            .as_array()
            .ok_or_else(|| registry_error(format!("'{}' is not an array", key)))?;

        for entry in entries {
            let entry = entry
                .as_str()
                .ok_or_else(|| registry_error(format!("non-string entry in '{}': {}", key, entry)))?;

            if entry.contains(':') {
                continue;
            }

            let network = parse_ipv4_cidr(entry)
                .ok_or_else(|| registry_error(format!("invalid CIDR: {}", entry)))?;
            networks.push(network);
        }
    }

    Ok(aggregate(&networks))
}

/// `a.b.c.d/n` or a bare address as /32, host bits cleared
fn parse_ipv4_cidr(entry: &str) -> Option<Ipv4Net> {
    if entry.contains('/') {
        entry.parse::<Ipv4Net>().ok().map(|net| net.trunc())
    } else {
        entry.parse::<Ipv4Addr>().ok().map(Ipv4Net::from)
    }
}

/// Minimal set of non-overlapping blocks covering exactly the same addresses
///
/// Deterministic and independent of input order.
pub fn aggregate(networks: &[Ipv4Net]) -> Vec<Ipv4Net> {
    let truncated: Vec<Ipv4Net> = networks.iter().map(|net| net.trunc()).collect();
    Ipv4Net::aggregate(&truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn nets(list: &[&str]) -> Vec<Ipv4Net> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn covered(networks: &[Ipv4Net]) -> HashSet<u32> {
        networks
            .iter()
            .flat_map(|net| u32::from(net.network())..=u32::from(net.broadcast()))
            .collect()
    }

    /// xorshift, so the generated sets are the same on every run
    fn random_networks(seed: &mut u32, count: usize) -> Vec<Ipv4Net> {
        (0..count)
            .map(|_| {
                *seed ^= *seed << 13;
                *seed ^= *seed >> 17;
                *seed ^= *seed << 5;
                let offset = *seed & 0x0fff;
                let prefix = 22 + (*seed >> 20) % 11;
                let addr = Ipv4Addr::from(0x0a00_0000 | offset);
                Ipv4Net::new(addr, prefix as u8).unwrap().trunc()
            })
            .collect()
    }

    #[test]
    fn test_aggregate_merges_adjacent_and_contained() {
        let input = nets(&["192.30.252.0/23", "192.30.254.0/23", "192.30.253.7/32", "10.0.0.0/8"]);
        assert_eq!(aggregate(&input), nets(&["10.0.0.0/8", "192.30.252.0/22"]));
    }

    #[test]
    fn test_aggregate_drops_duplicates() {
        let input = nets(&["140.82.112.0/20", "140.82.112.0/20", "140.82.113.0/24"]);
        assert_eq!(aggregate(&input), nets(&["140.82.112.0/20"]));
    }

    #[test]
    fn test_aggregate_keeps_unaligned_neighbours_apart() {
        // Adjacent but not mergeable into one aligned block
        let input = nets(&["10.0.1.0/24", "10.0.2.0/24"]);
        assert_eq!(aggregate(&input), input);
    }

    #[test]
    fn test_aggregate_preserves_coverage() {
        let mut seed = 0x2545_f491;
        for _ in 0..50 {
            let input = random_networks(&mut seed, 12);
            let output = aggregate(&input);

            assert_eq!(covered(&input), covered(&output));
            for (i, a) in output.iter().enumerate() {
                for b in output.iter().skip(i + 1) {
                    assert!(!a.contains(b) && !b.contains(a), "{} overlaps {}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_aggregate_order_independent() {
        let mut seed = 0x1234_5678;
        let input = random_networks(&mut seed, 20);
        let mut reversed = input.clone();
        reversed.reverse();

        assert_eq!(aggregate(&input), aggregate(&reversed));
        assert_eq!(aggregate(&aggregate(&input)), aggregate(&input));
    }

    #[test]
    fn test_parse_registry() {
        let document = json!({
            "web": ["192.30.252.0/22", "2a0a:a440::/29", "185.199.108.0/22"],
            "api": ["192.30.252.0/22", "140.82.112.0/20"],
            "git": ["140.82.112.3", "2606:50c0::/32"],
            "hooks": ["1.2.3.0/24"],
        });

        let ranges = parse_registry("github", &document, &["web", "api", "git"]).unwrap();
        assert_eq!(
            ranges,
            nets(&["140.82.112.0/20", "185.199.108.0/22", "192.30.252.0/22"])
        );
    }

    #[test]
    fn test_parse_registry_missing_key() {
        let document = json!({"web": [], "api": []});
        let err = parse_registry("github", &document, &["web", "api", "git"]).unwrap_err();
        assert!(matches!(err, FirewallError::Registry { .. }));
        assert!(err.to_string().contains("'git'"));
    }

    #[test]
    fn test_parse_registry_invalid_entry_fails_hard() {
        let document = json!({"web": ["192.30.252.0/22", "192.30.252.0/33"]});
        assert!(matches!(
            parse_registry("github", &document, &["web"]),
            Err(FirewallError::Registry { .. })
        ));

        let document = json!({"web": ["not-a-cidr"]});
        assert!(parse_registry("github", &document, &["web"]).is_err());

        let document = json!({"web": [42]});
        assert!(parse_registry("github", &document, &["web"]).is_err());
    }

    #[test]
    fn test_validate_addresses() {
        let answers: Vec<IpAddr> = vec![
            IpAddr::V4(Ipv4Addr::new(140, 82, 112, 3)),
            "2606:50c0:8000::154".parse().unwrap(),
            IpAddr::V4(Ipv4Addr::new(140, 82, 112, 3)),
        ];
        let addresses = validate_addresses("github.com", answers).unwrap();
        assert_eq!(addresses.into_iter().collect::<Vec<_>>(), vec![Ipv4Addr::new(140, 82, 112, 3)]);
    }

    #[test]
    fn test_validate_addresses_ipv6_only_fails() {
        let answers: Vec<IpAddr> = vec!["2606:50c0:8000::154".parse().unwrap()];
        assert!(matches!(
            validate_addresses("v6.example", answers),
            Err(FirewallError::Resolution { .. })
        ));
    }

    #[test]
    fn test_validate_addresses_rejects_unspecified() {
        let answers = vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)];
        assert!(validate_addresses("sinkholed.example", answers).is_err());
    }
}
