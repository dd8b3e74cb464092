//! In-memory stand-ins for iptables, ipset, DNS and the probes

use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::error::{FirewallError, Result};
use crate::resolver::{self, Resolve};
use crate::verify::Probe;
use ipnet::Ipv4Net;
use sandbox_policy::RangeRegistry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};

pub const ROUTES: &str = "default via 172.18.0.1 dev eth0\n172.18.0.0/16 dev eth0 proto kernel scope link src 172.18.0.5\n";

const BUILTIN_CHAINS: [&str; 5] = ["INPUT", "FORWARD", "OUTPUT", "PREROUTING", "POSTROUTING"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub chains: BTreeMap<String, Vec<String>>,
    pub policies: BTreeMap<String, String>,
}

/// Models enough of iptables and ipset to observe the final state
#[derive(Debug, Clone, Default)]
pub struct FakeFirewall {
    pub tables: BTreeMap<String, Table>,
    pub sets: BTreeMap<String, BTreeSet<String>>,
    pub calls: Vec<Invocation>,
    pub routes: String,
    /// Commands whose display starts with this prefix exit non-zero
    pub fail_prefix: Option<String>,
}

impl FakeFirewall {
    pub fn new() -> Self {
        Self {
            routes: ROUTES.to_string(),
            ..Default::default()
        }
    }

    /// A container fresh from `docker run`, with the embedded DNS NAT rules
    pub fn with_docker_dns() -> Self {
        let mut fake = Self::new();
        let nat = fake.tables.entry("nat".to_string()).or_default();
        nat.chains.insert(
            "OUTPUT".to_string(),
            vec!["-d 127.0.0.11/32 -j DOCKER_OUTPUT".to_string()],
        );
        nat.chains.insert(
            "DOCKER_OUTPUT".to_string(),
            vec!["-d 127.0.0.11/32 -p udp -m udp --dport 53 -j DNAT --to-destination 127.0.0.11:43535".to_string()],
        );
        fake
    }

    pub fn filter(&self) -> Table {
        self.tables.get("filter").cloned().unwrap_or_default()
    }

    fn ok(stdout: String) -> CommandOutput {
        CommandOutput {
            success: true,
            stdout,
            stderr: String::new(),
        }
    }

    fn err(stderr: &str) -> CommandOutput {
        CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn save(&self, table: &str) -> String {
        let mut out = format!("*{}\n", table);
        if let Some(t) = self.tables.get(table) {
            for (chain, rules) in &t.chains {
                for rule in rules {
                    out.push_str(&format!("-A {} {}\n", chain, rule));
                }
            }
        }
        out.push_str("COMMIT\n");
        out
    }

    fn iptables(&mut self, args: &[String]) -> CommandOutput {
        let (table, rest) = match args.first().map(String::as_str) {
            Some("-t") => (args[1].clone(), &args[2..]),
            _ => ("filter".to_string(), args),
        };
        let t = self.tables.entry(table).or_default();

        match rest[0].as_str() {
            "-F" => t.chains.values_mut().for_each(Vec::clear),
            "-X" => t
                .chains
                .retain(|name, rules| BUILTIN_CHAINS.contains(&name.as_str()) || !rules.is_empty()),
            "-N" => {
                if t.chains.contains_key(&rest[1]) {
                    return Self::err("iptables: Chain already exists.");
                }
                t.chains.insert(rest[1].clone(), Vec::new());
            }
            "-A" => t
                .chains
                .entry(rest[1].clone())
                .or_default()
                .push(rest[2..].join(" ")),
            "-P" => {
                t.policies.insert(rest[1].clone(), rest[2].clone());
            }
            other => return Self::err(&format!("unsupported option {}", other)),
        }
        Self::ok(String::new())
    }

    fn ipset(&mut self, args: &[String]) -> CommandOutput {
        match args[0].as_str() {
            "create" => {
                if self.sets.contains_key(&args[1]) {
                    return Self::err("ipset v7.19: Set cannot be created: set with the same name already exists");
                }
                self.sets.insert(args[1].clone(), BTreeSet::new());
            }
            "destroy" => {
                if self.sets.remove(&args[1]).is_none() {
                    return Self::err("ipset v7.19: The set with the given name does not exist");
                }
            }
            "add" => match self.sets.get_mut(&args[1]) {
                Some(set) => {
                    set.insert(args[2].clone());
                }
                None => return Self::err("ipset v7.19: The set with the given name does not exist"),
            },
            other => return Self::err(&format!("unsupported command {}", other)),
        }
        Self::ok(String::new())
    }
}

impl CommandRunner for FakeFirewall {
    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.push(invocation.clone());

        if let Some(prefix) = &self.fail_prefix {
            if invocation.to_string().starts_with(prefix.as_str()) {
                return Ok(Self::err("simulated failure"));
            }
        }

        let output = match invocation.program.as_str() {
            "iptables" => self.iptables(&invocation.args),
            "iptables-save" => Self::ok(self.save(&invocation.args[1])),
            "ipset" => self.ipset(&invocation.args),
            "ip" => Self::ok(self.routes.clone()),
            other => {
                return Err(FirewallError::Spawn {
                    command: other.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            }
        };
        Ok(output)
    }
}

/// DNS answers and registry documents from fixed tables
#[derive(Debug, Clone, Default)]
pub struct FakeResolver {
    pub domains: HashMap<String, Vec<IpAddr>>,
    pub registries: HashMap<String, serde_json::Value>,
}

impl FakeResolver {
    pub fn with_domain(mut self, domain: &str, addrs: &[&str]) -> Self {
        let addrs: Vec<IpAddr> = addrs.iter().map(|a| a.parse().unwrap()).collect();
        self.domains.insert(domain.to_string(), addrs);
        self
    }

    pub fn with_github_meta(mut self) -> Self {
        self.registries.insert(
            "github".to_string(),
            serde_json::json!({
                "web": ["192.30.252.0/22", "185.199.108.0/22", "140.82.112.0/20", "2a0a:a440::/29"],
                "api": ["192.30.252.0/22", "140.82.112.0/20", "143.55.64.0/20"],
                "git": ["192.30.252.0/22", "140.82.112.0/20", "140.82.112.3"],
            }),
        );
        self
    }
}

impl Resolve for FakeResolver {
    fn resolve_domain(&self, domain: &str) -> Result<BTreeSet<Ipv4Addr>> {
        let answers = self.domains.get(domain).ok_or_else(|| FirewallError::Resolution {
            domain: domain.to_string(),
            reason: "Name or service not known".to_string(),
        })?;
        resolver::validate_addresses(domain, answers.iter().copied())
    }

    fn fetch_service_ranges(&self, service: &str, registry: &RangeRegistry) -> Result<Vec<Ipv4Net>> {
        let document = self.registries.get(service).ok_or_else(|| FirewallError::Registry {
            service: service.to_string(),
            reason: "connection refused".to_string(),
        })?;
        resolver::parse_registry(service, document, registry.keys)
    }
}

/// Reaches exactly the URLs it was given
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    pub reachable: HashSet<String>,
}

impl FakeProbe {
    pub fn reaching(urls: &[&str]) -> Self {
        Self {
            reachable: urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

impl Probe for FakeProbe {
    fn connect(&self, url: &str) -> std::result::Result<(), String> {
        if self.reachable.contains(url) {
            Ok(())
        } else {
            Err("Connection refused".to_string())
        }
    }
}
