use clap::Parser;
use sandbox_firewall::{EngineOptions, HttpProbe, RuleEngine, SystemResolver, SystemRunner};
use sandbox_policy::config::loader::DEFAULT_FIREWALL_POLICY;
use sandbox_policy::{AuditLog, PolicyLoader, Verbosity};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Parser, Debug)]
#[command(name = "init-firewall")]
#[command(about = "Lock the container's egress down to the hosts allowed by a policy")]
struct Args {
    /// Policy document (JSON, YAML or TOML)
    #[arg(long, env = "POLICY_FILE", default_value = DEFAULT_FIREWALL_POLICY)]
    policy: PathBuf,

    /// Set every default policy to DROP if any phase fails
    #[arg(long, env = "FIREWALL_DENY_ON_FAILURE")]
    deny_on_failure: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let audit = Arc::new(AuditLog::stdout(Verbosity::Normal));

    tracing::info!("Loading policy from {}", args.policy.display());
    let policy = PolicyLoader::load(&args.policy)?;

    let options = EngineOptions {
        deny_on_failure: args.deny_on_failure,
        ..Default::default()
    };
    let mut engine = RuleEngine::new(
        SystemRunner,
        SystemResolver::new()?,
        HttpProbe::new()?,
        Arc::clone(&audit),
        options,
    );

    let summary = engine.run(&policy)?;
    tracing::debug!(?summary, "Run summary");

    audit.info(format!(
        "Firewall configuration complete ({} allow-set entries)",
        summary.allow_set.len()
    ));
    Ok(())
}
