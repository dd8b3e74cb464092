//! External command execution

use crate::error::{FirewallError, Result};
use std::fmt;
use std::process::Command;
use tracing::debug;

/// One external command, e.g. `iptables -A OUTPUT -o lo -j ACCEPT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// A non-zero exit is an error unless this is false
    pub checked: bool,
}

impl Invocation {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            checked: true,
        }
    }

    pub fn iptables(args: &[&str]) -> Self {
        Self::new("iptables", args)
    }

    pub fn ipset(args: &[&str]) -> Self {
        Self::new("ipset", args)
    }

    /// Tolerate a non-zero exit (e.g. destroying a set that may not exist)
    pub fn unchecked(mut self) -> Self {
        self.checked = false;
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.program)
        } else {
            write!(f, "{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs commands that change or inspect packet filter state
///
/// Calls are blocking and strictly sequential; the packet filter is a single
/// global resource.
pub trait CommandRunner {
    /// Run a command and report its outcome without judging it
    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Run a command, failing on a non-zero exit when it is checked
    fn execute(&mut self, invocation: &Invocation) -> Result<CommandOutput> {
        let output = self.run(invocation)?;
        if invocation.checked && !output.success {
            return Err(FirewallError::Command {
                command: invocation.to_string(),
                stderr: output.stderr.trim_end().to_string(),
            });
        }
        Ok(output)
    }
}

/// Runs commands on the host with `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!("Running: {}", invocation);

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .map_err(|source| FirewallError::Spawn {
                command: invocation.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exit(bool);

    impl CommandRunner for Exit {
        fn run(&mut self, _invocation: &Invocation) -> Result<CommandOutput> {
            Ok(CommandOutput {
                success: self.0,
                stdout: String::new(),
                stderr: "iptables: No chain/target/match by that name.\n".to_string(),
            })
        }
    }

    #[test]
    fn test_display() {
        let inv = Invocation::iptables(&["-A", "OUTPUT", "-o", "lo", "-j", "ACCEPT"]);
        assert_eq!(inv.to_string(), "iptables -A OUTPUT -o lo -j ACCEPT");
        assert_eq!(Invocation::new("ip", &[]).to_string(), "ip");
    }

    #[test]
    fn test_checked_failure_is_error() {
        let inv = Invocation::iptables(&["-F"]);
        match Exit(false).execute(&inv) {
            Err(FirewallError::Command { command, stderr }) => {
                assert_eq!(command, "iptables -F");
                assert_eq!(stderr, "iptables: No chain/target/match by that name.");
            }
            other => panic!("Expected command error, got {:?}", other),
        }
    }

    #[test]
    fn test_unchecked_failure_is_ok() {
        let inv = Invocation::ipset(&["destroy", "allowed-domains"]).unchecked();
        let output = Exit(false).execute(&inv).unwrap();
        assert!(!output.success);
    }

    #[test]
    fn test_system_runner_missing_binary() {
        let inv = Invocation::new("definitely-not-a-real-binary-for-tests", &[]);
        assert!(matches!(
            SystemRunner.execute(&inv),
            Err(FirewallError::Spawn { .. })
        ));
    }
}
