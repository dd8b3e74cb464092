use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

mod image;

use image::{Target, Versions};

#[derive(Parser, Debug)]
#[command(name = "agent-sandbox-build")]
#[command(about = "Build the agent sandbox container images")]
struct Args {
    /// Which images to build
    #[arg(value_enum, default_value_t = Target::All)]
    target: Target,

    /// Directory holding the image build contexts
    #[arg(long, env = "AGENT_SANDBOX_IMAGES", default_value = "images")]
    images_dir: PathBuf,

    #[command(flatten)]
    versions: Versions,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
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

    for build in args.target.images(&args.images_dir, &args.versions) {
        build.run()?;
    }

    println!("Done.");
    Ok(())
}
