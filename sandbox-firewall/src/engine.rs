//! Firewall rule engine
//!
//! Runs the phases in [`Phase::ALL`] order. A phase starts only after the
//! previous one finished cleanly; the first error ends the run. Without
//! `deny_on_failure` the packet filter is left as the completed commands
//! made it.

use crate::command::{CommandRunner, Invocation};
use crate::error::{FirewallError, PhaseError, Result};
use crate::resolver::Resolve;
use crate::rules;
use crate::verify::{self, Probe, VERIFY_BLOCKED_URL};
use indexmap::IndexSet;
use ipnet::Ipv4Net;
use sandbox_policy::{AuditLog, DomainPattern, Policy};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Capture the embedded DNS NAT rules
    Preserve,
    /// Flush every table and destroy the allow-set
    Teardown,
    /// Re-install the captured NAT rules
    Restore,
    /// DNS, SSH and loopback
    Foundation,
    /// Create the allow-set and fill it from the policy
    AllowSet,
    /// Allow the /24 of the default gateway
    HostNetwork,
    /// Default deny plus allow-set admission
    Lockdown,
    /// Live negative and positive probes
    Verify,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Preserve,
        Phase::Teardown,
        Phase::Restore,
        Phase::Foundation,
        Phase::AllowSet,
        Phase::HostNetwork,
        Phase::Lockdown,
        Phase::Verify,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Preserve => "preserve",
            Phase::Teardown => "teardown",
            Phase::Restore => "restore",
            Phase::Foundation => "foundation",
            Phase::AllowSet => "allow-set",
            Phase::HostNetwork => "host-network",
            Phase::Lockdown => "lockdown",
            Phase::Verify => "verify",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub set_name: String,
    pub blocked_probe_url: String,
    /// Set every default policy to DROP if a phase fails
    pub deny_on_failure: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            set_name: rules::ALLOW_SET.to_string(),
            blocked_probe_url: VERIFY_BLOCKED_URL.to_string(),
            deny_on_failure: false,
        }
    }
}

/// What a completed run installed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub preserved_nat: Vec<String>,
    /// Allow-set entries in insertion order, ipset notation
    pub allow_set: Vec<String>,
    pub host_network: Option<Ipv4Net>,
    /// Name of the endpoint the positive probe reached, if one was configured
    pub verified: Option<String>,
}

pub struct RuleEngine<C, R, P> {
    runner: C,
    resolver: R,
    probe: P,
    audit: Arc<AuditLog>,
    options: EngineOptions,
}

impl<C, R, P> RuleEngine<C, R, P>
where
    C: CommandRunner,
    R: Resolve,
    P: Probe,
{
    pub fn new(runner: C, resolver: R, probe: P, audit: Arc<AuditLog>, options: EngineOptions) -> Self {
        Self {
            runner,
            resolver,
            probe,
            audit,
            options,
        }
    }

    pub fn runner(&self) -> &C {
        &self.runner
    }

    pub fn into_runner(self) -> C {
        self.runner
    }

    /// Apply the policy, phase by phase
    pub fn run(&mut self, policy: &Policy) -> std::result::Result<Summary, PhaseError> {
        let mut summary = Summary::default();

        for phase in Phase::ALL {
            info!(phase = %phase, "Starting phase");

            let outcome = match phase {
                Phase::Preserve => self.preserve().map(|saved| summary.preserved_nat = saved),
                Phase::Teardown => self.teardown(),
                Phase::Restore => self.restore(&summary.preserved_nat),
                Phase::Foundation => self.run_all(&rules::foundation()),
                Phase::AllowSet => self
                    .populate_allow_set(policy)
                    .map(|entries| summary.allow_set = entries),
                Phase::HostNetwork => self
                    .allow_host_network()
                    .map(|network| summary.host_network = Some(network)),
                Phase::Lockdown => self.run_all(&rules::lockdown(&self.options.set_name)),
                Phase::Verify => self.verify(policy).map(|target| summary.verified = target),
            };

            if let Err(source) = outcome {
                return Err(self.fail(phase, source));
            }
        }

        info!("Firewall configuration complete");
        Ok(summary)
    }

    fn fail(&mut self, phase: Phase, source: FirewallError) -> PhaseError {
        error!(phase = %phase, "{}", source);

        if self.options.deny_on_failure {
            warn!("Setting default policies to DROP after failure");
            for invocation in rules::deny_all() {
                if let Err(e) = self.runner.execute(&invocation) {
                    error!("Failed to apply {}: {}", invocation, e);
                }
            }
        }

        PhaseError { phase, source }
    }

    fn run_all(&mut self, invocations: &[Invocation]) -> Result<()> {
        for invocation in invocations {
            self.runner.execute(invocation)?;
        }
        Ok(())
    }

    fn preserve(&mut self) -> Result<Vec<String>> {
        let output = self.runner.execute(&rules::save_nat())?;
        if !output.success {
            debug!("iptables-save failed, nothing to preserve");
            return Ok(Vec::new());
        }
        Ok(rules::preserved_nat_rules(&output.stdout))
    }

    fn teardown(&mut self) -> Result<()> {
        let set = self.options.set_name.clone();
        self.run_all(&rules::teardown(&set))
    }

    fn restore(&mut self, preserved: &[String]) -> Result<()> {
        if preserved.is_empty() {
            info!("No Docker DNS rules to restore");
            return Ok(());
        }
        info!("Restoring {} Docker DNS rules...", preserved.len());
        self.run_all(&rules::restore_nat(preserved))
    }

    fn populate_allow_set(&mut self, policy: &Policy) -> Result<Vec<String>> {
        let set = self.options.set_name.clone();
        self.runner.execute(&rules::create_allow_set(&set))?;

        // Resolve everything before inserting anything, so a single failure
        // leaves the set empty rather than partially filled.
        let entries = self.collect_entries(policy)?;

        for entry in &entries {
            self.runner.execute(&rules::add_to_allow_set(&set, entry))?;
        }

        Ok(entries.iter().map(rules::set_entry).collect())
    }

    fn collect_entries(&self, policy: &Policy) -> Result<IndexSet<Ipv4Net>> {
        let mut entries = IndexSet::new();

        info!("Processing services...");
        let (services, unknown) = policy.resolve_services();
        for name in unknown {
            warn!("Unknown service '{}', skipping", name);
        }

        for service in services {
            let Some(registry) = service.ranges else {
                warn!(
                    service = service.name,
                    "Service publishes no address ranges; enforced by the proxy only"
                );
                continue;
            };

            for range in self.resolver.fetch_service_ranges(service.name, &registry)? {
                info!("  Adding {} range {}", service.name, range);
                entries.insert(range);
            }
        }

        info!("Processing domains...");
        for pattern in &policy.domains {
            match pattern {
                DomainPattern::Wildcard(_) => {
                    warn!(
                        pattern = %pattern,
                        "Wildcard domains cannot be resolved; enforced by the proxy only"
                    );
                }
                DomainPattern::Exact(domain) => {
                    for addr in self.resolver.resolve_domain(domain)? {
                        info!("  Adding {} for {}", addr, domain);
                        entries.insert(Ipv4Net::from(addr));
                    }
                }
            }
        }

        Ok(entries)
    }

    fn allow_host_network(&mut self) -> Result<Ipv4Net> {
        let routes = self.runner.execute(&rules::list_routes())?;
        let gateway = rules::parse_default_gateway(&routes.stdout)?;
        let network = rules::host_network(gateway)?;
        info!("Host network detected as: {}", network);

        self.run_all(&rules::allow_host_network(&network))?;
        Ok(network)
    }

    fn verify(&mut self, policy: &Policy) -> Result<Option<String>> {
        info!("Verifying firewall rules...");

        let blocked = self.options.blocked_probe_url.clone();
        match self.probe.connect(&blocked) {
            Ok(()) => {
                return Err(FirewallError::Verification(format!(
                    "was able to reach {}",
                    blocked
                )))
            }
            Err(reason) => {
                debug!("Blocked probe failed as expected: {}", reason);
                self.audit.info(format!(
                    "Firewall verification passed - unable to reach {} as expected",
                    blocked
                ));
            }
        }

        let Some(target) = verify::positive_target(policy) else {
            self.audit
                .info("WARNING: No services or domains in policy to verify positive connectivity");
            return Ok(None);
        };

        self.probe.connect(&target.url).map_err(|reason| {
            FirewallError::Verification(format!("unable to reach {}: {}", target.name, reason))
        })?;

        self.audit.info(format!(
            "Firewall verification passed - able to reach {}",
            target.name
        ));
        Ok(Some(target.name))
    }
}
