use clap::Parser;
use sandbox_policy::config::loader::DEFAULT_PROXY_POLICY;
use sandbox_policy::{AuditLog, PolicyEngine, PolicyError, PolicyLoader, ProxyMode, Verbosity};
use sandbox_proxy::{Enforcer, ProxyServer, ProxyServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Parser, Debug)]
#[command(name = "egress-proxy")]
#[command(about = "HTTP forward proxy that enforces the sandbox egress allowlist")]
struct Args {
    /// Address to accept proxy connections on
    #[arg(long, env = "PROXY_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Proxy mode: log | enforce
    #[arg(long, short = 'm', env = "PROXY_MODE", default_value = "log")]
    mode: ProxyMode,

    /// Audit verbosity: normal | quiet
    #[arg(long, env = "PROXY_LOG_LEVEL", default_value = "normal")]
    log_level: Verbosity,

    /// Policy document, read only in enforce mode
    #[arg(long, short = 'p', env = "PROXY_POLICY", default_value = DEFAULT_PROXY_POLICY)]
    policy: PathBuf,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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

    let audit = Arc::new(AuditLog::stdout(args.log_level));

    let engine = match args.mode {
        ProxyMode::Permissive => {
            audit.info("Running in log mode (no enforcement)");
            PolicyEngine::permissive()
        }
        ProxyMode::Enforcing => {
            let policy = PolicyLoader::load(&args.policy).map_err(|e| {
                if let PolicyError::MissingFile { path } = &e {
                    audit.info(format!(
                        "PROXY_MODE=enforce but no policy file at {}",
                        path.display()
                    ));
                }
                e
            })?;
            PolicyEngine::from_policy(&policy, &audit)
        }
    };

    let server = ProxyServer::new(ProxyServerConfig {
        listen: args.listen,
        enforcer: Arc::new(Enforcer::new(engine, audit)),
    });
    server.start().await?;

    Ok(())
}
