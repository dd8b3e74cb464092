//! Packet filter rule sets, one function per phase
//!
//! Everything here is pure: each function returns the commands to run and
//! the engine decides when to run them.

use crate::command::Invocation;
use crate::error::{FirewallError, Result};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// ipset consulted by the final OUTPUT allow rule
pub const ALLOW_SET: &str = "allowed-domains";

/// Embedded DNS server address used by Docker inside containers
pub const EMBEDDED_DNS: &str = "127.0.0.11";

/// Chains Docker uses to redirect embedded DNS traffic
const DOCKER_NAT_CHAINS: [&str; 2] = ["DOCKER_OUTPUT", "DOCKER_POSTROUTING"];

pub fn save_nat() -> Invocation {
    Invocation::new("iptables-save", &["-t", "nat"]).unchecked()
}

/// Keep only the NAT rules needed for the embedded DNS server
pub fn preserved_nat_rules(saved: &str) -> Vec<String> {
    saved
        .lines()
        .filter(|line| line.starts_with("-A ") && line.contains(EMBEDDED_DNS))
        .map(|line| line.trim().to_string())
        .collect()
}

/// Back to a clean, open slate
///
/// Default policies are reset first so a re-run can still reach DNS and the
/// range registry before the allow-set exists.
pub fn teardown(set: &str) -> Vec<Invocation> {
    vec![
        Invocation::iptables(&["-P", "INPUT", "ACCEPT"]),
        Invocation::iptables(&["-P", "FORWARD", "ACCEPT"]),
        Invocation::iptables(&["-P", "OUTPUT", "ACCEPT"]),
        Invocation::iptables(&["-F"]),
        Invocation::iptables(&["-X"]),
        Invocation::iptables(&["-t", "nat", "-F"]),
        Invocation::iptables(&["-t", "nat", "-X"]),
        Invocation::iptables(&["-t", "mangle", "-F"]),
        Invocation::iptables(&["-t", "mangle", "-X"]),
        Invocation::ipset(&["destroy", set]).unchecked(),
    ]
}

pub fn restore_nat(rules: &[String]) -> Vec<Invocation> {
    if rules.is_empty() {
        return Vec::new();
    }

    let mut commands: Vec<Invocation> = DOCKER_NAT_CHAINS
        .iter()
        .map(|chain| Invocation::iptables(&["-t", "nat", "-N", *chain]).unchecked())
        .collect();

    for rule in rules {
        let mut args = vec!["-t", "nat"];
        args.extend(rule.split_whitespace());
        commands.push(Invocation::iptables(&args).unchecked());
    }

    commands
}

/// DNS, SSH and loopback, present whatever the policy says
pub fn foundation() -> Vec<Invocation> {
    vec![
        Invocation::iptables(&["-A", "OUTPUT", "-p", "udp", "--dport", "53", "-j", "ACCEPT"]),
        Invocation::iptables(&["-A", "INPUT", "-p", "udp", "--sport", "53", "-j", "ACCEPT"]),
        Invocation::iptables(&["-A", "OUTPUT", "-p", "tcp", "--dport", "22", "-j", "ACCEPT"]),
        Invocation::iptables(&[
            "-A", "INPUT", "-p", "tcp", "--sport", "22", "-m", "state", "--state", "ESTABLISHED",
            "-j", "ACCEPT",
        ]),
        Invocation::iptables(&["-A", "INPUT", "-i", "lo", "-j", "ACCEPT"]),
        Invocation::iptables(&["-A", "OUTPUT", "-o", "lo", "-j", "ACCEPT"]),
    ]
}

pub fn create_allow_set(set: &str) -> Invocation {
    Invocation::ipset(&["create", set, "hash:net"])
}

pub fn add_to_allow_set(set: &str, entry: &Ipv4Net) -> Invocation {
    let entry = set_entry(entry);
    Invocation::ipset(&["add", set, &entry, "-exist"])
}

/// ipset notation: bare address for a /32, CIDR otherwise
pub fn set_entry(net: &Ipv4Net) -> String {
    if net.prefix_len() == 32 {
        net.addr().to_string()
    } else {
        net.to_string()
    }
}

pub fn list_routes() -> Invocation {
    Invocation::new("ip", &["route"])
}

/// Gateway address from the `default via <ip> ...` line of `ip route`
pub fn parse_default_gateway(routes: &str) -> Result<Ipv4Addr> {
    let gateway = routes
        .lines()
        .find(|line| line.starts_with("default"))
        .and_then(|line| line.split_whitespace().nth(2))
        .ok_or_else(|| FirewallError::HostNetwork("no default route".to_string()))?;

    gateway
        .parse()
        .map_err(|_| FirewallError::HostNetwork(format!("invalid host IP format: {}", gateway)))
}

/// The /24 containing the gateway
pub fn host_network(gateway: Ipv4Addr) -> Result<Ipv4Net> {
    Ipv4Net::new(gateway, 24)
        .map(|net| net.trunc())
        .map_err(|e| FirewallError::HostNetwork(e.to_string()))
}

pub fn allow_host_network(network: &Ipv4Net) -> Vec<Invocation> {
    let network = network.to_string();
    vec![
        Invocation::iptables(&["-A", "INPUT", "-s", &network, "-j", "ACCEPT"]),
        Invocation::iptables(&["-A", "OUTPUT", "-d", &network, "-j", "ACCEPT"]),
    ]
}

/// Default deny, allow-set admission, explicit reject for everything else
pub fn lockdown(set: &str) -> Vec<Invocation> {
    vec![
        Invocation::iptables(&["-P", "INPUT", "DROP"]),
        Invocation::iptables(&["-P", "FORWARD", "DROP"]),
        Invocation::iptables(&["-P", "OUTPUT", "DROP"]),
        Invocation::iptables(&[
            "-A", "INPUT", "-m", "state", "--state", "ESTABLISHED,RELATED", "-j", "ACCEPT",
        ]),
        Invocation::iptables(&[
            "-A", "OUTPUT", "-m", "state", "--state", "ESTABLISHED,RELATED", "-j", "ACCEPT",
        ]),
        Invocation::iptables(&["-A", "OUTPUT", "-m", "set", "--match-set", set, "dst", "-j", "ACCEPT"]),
        Invocation::iptables(&["-A", "OUTPUT", "-j", "REJECT", "--reject-with", "icmp-admin-prohibited"]),
    ]
}

/// Fallback used by `--deny-on-failure`
pub fn deny_all() -> Vec<Invocation> {
    ["INPUT", "FORWARD", "OUTPUT"]
        .iter()
        .map(|chain| Invocation::iptables(&["-P", *chain, "DROP"]))
        .collect()
}
