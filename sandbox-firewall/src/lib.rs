//! iptables/ipset egress lockdown for the sandbox container
//!
//! Compiles a [`sandbox_policy::Policy`] into packet filter state through a
//! fixed sequence of phases (see [`engine::Phase`]). Any failure stops the
//! sequence; nothing is retried.

pub mod command;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod rules;
pub mod verify;

#[cfg(test)]
mod testing;

pub use command::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use engine::{EngineOptions, Phase, RuleEngine, Summary};
pub use error::{FirewallError, PhaseError, Result};
pub use resolver::{Resolve, SystemResolver};
pub use verify::{HttpProbe, Probe};
