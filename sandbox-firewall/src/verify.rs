//! Live connectivity probes run after lockdown

use crate::error::Result;
use sandbox_policy::Policy;
use std::time::Duration;

/// Never allowlisted; reaching it means lockdown is not in effect
pub const VERIFY_BLOCKED_URL: &str = "https://example.com";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts a connection to a URL
pub trait Probe {
    /// Ok if the endpoint answered at all, whatever the HTTP status
    fn connect(&self, url: &str) -> std::result::Result<(), String>;
}

/// HTTPS probe with bounded connect and request timeouts
pub struct HttpProbe {
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl Probe for HttpProbe {
    fn connect(&self, url: &str) -> std::result::Result<(), String> {
        self.client
            .get(url)
            .send()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// An endpoint the policy is expected to allow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    pub name: String,
}

/// First service with a published range registry, else the first exact domain
pub fn positive_target(policy: &Policy) -> Option<Target> {
    let (services, _) = policy.resolve_services();

    if let Some(registry) = services.iter().find_map(|s| s.ranges) {
        let name = registry
            .probe_url
            .trim_start_matches("https://")
            .split('/')
            .next()
            .unwrap_or(registry.probe_url);
        return Some(Target {
            url: registry.probe_url.to_string(),
            name: name.to_string(),
        });
    }

    policy.exact_domains().next().map(|domain| Target {
        url: format!("https://{}", domain),
        name: domain.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_prefers_range_service() {
        let policy = Policy::from_parts(["claude", "github"], ["pypi.org"]).unwrap();
        assert_eq!(
            positive_target(&policy),
            Some(Target {
                url: "https://api.github.com/zen".to_string(),
                name: "api.github.com".to_string(),
            })
        );
    }

    #[test]
    fn test_target_falls_back_to_first_exact_domain() {
        let policy = Policy::from_parts(["claude"], ["*.npmjs.org", "pypi.org", "crates.io"]).unwrap();
        let target = positive_target(&policy).unwrap();
        assert_eq!(target.url, "https://pypi.org");
        assert_eq!(target.name, "pypi.org");
    }

    #[test]
    fn test_no_target() {
        let policy = Policy::from_parts(["claude"], ["*.npmjs.org"]).unwrap();
        assert_eq!(positive_target(&policy), None);
        assert_eq!(positive_target(&Policy::default()), None);
    }
}
