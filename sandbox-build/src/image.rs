//! Image definitions and the `docker build` invocations that produce them

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const BASE_TAG: &str = "agent-sandbox-base:local";
pub const CLAUDE_TAG: &str = "agent-sandbox-claude:local";

/// Tool versions baked into the images
#[derive(Args, Debug, Clone)]
pub struct Versions {
    /// Timezone
    #[arg(long, env = "TZ", default_value = "America/Los_Angeles")]
    pub tz: String,

    /// yq version
    #[arg(long, env = "YQ_VERSION", default_value = "v4.44.1")]
    pub yq_version: String,

    /// Python version
    #[arg(long, env = "PYTHON_VERSION", default_value = "3.13.11")]
    pub python_version: String,

    /// uv version
    #[arg(long, env = "UV_VERSION", default_value = "0.9.26")]
    pub uv_version: String,

    /// git-delta version
    #[arg(long, env = "GIT_DELTA_VERSION", default_value = "0.18.2")]
    pub git_delta_version: String,

    /// zsh-in-docker version
    #[arg(long, env = "ZSH_IN_DOCKER_VERSION", default_value = "1.2.0")]
    pub zsh_in_docker_version: String,

    /// Claude Code version
    #[arg(long, env = "CLAUDE_CODE_VERSION", default_value = "latest")]
    pub claude_code_version: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    Base,
    Claude,
    #[default]
    All,
}

impl Target {
    /// Images to build, dependencies first
    pub fn images(self, images_dir: &Path, versions: &Versions) -> Vec<ImageBuild> {
        match self {
            Target::Base => vec![ImageBuild::base(images_dir, versions)],
            Target::Claude => vec![ImageBuild::claude(images_dir, versions)],
            Target::All => vec![
                ImageBuild::base(images_dir, versions),
                ImageBuild::claude(images_dir, versions),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuild {
    pub tag: &'static str,
    pub context: PathBuf,
    pub build_args: Vec<(&'static str, String)>,
}

impl ImageBuild {
    pub fn base(images_dir: &Path, versions: &Versions) -> Self {
        Self {
            tag: BASE_TAG,
            context: images_dir.join("base"),
            build_args: vec![
                ("TZ", versions.tz.clone()),
                ("YQ_VERSION", versions.yq_version.clone()),
                ("GIT_DELTA_VERSION", versions.git_delta_version.clone()),
                ("ZSH_IN_DOCKER_VERSION", versions.zsh_in_docker_version.clone()),
            ],
        }
    }

    pub fn claude(images_dir: &Path, versions: &Versions) -> Self {
        Self {
            tag: CLAUDE_TAG,
            context: images_dir.join("agents").join("claude"),
            build_args: vec![
                ("BASE_IMAGE", BASE_TAG.to_string()),
                ("CLAUDE_CODE_VERSION", versions.claude_code_version.clone()),
                ("PYTHON_VERSION", versions.python_version.clone()),
                ("UV_VERSION", versions.uv_version.clone()),
            ],
        }
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new("docker");
        cmd.arg("build");
        for (key, value) in &self.build_args {
            cmd.arg("--build-arg").arg(format!("{}={}", key, value));
        }
        cmd.arg("-t").arg(self.tag).arg(&self.context);
        cmd
    }

    /// Run the build, inheriting stdio so docker's progress is visible
    pub fn run(&self) -> Result<()> {
        println!("Building {}...", self.tag);
        for (key, value) in &self.build_args {
            println!("  {}={}", key, value);
        }

        let mut cmd = self.command();
        tracing::debug!("Command: {}", format_command(&cmd));

        let status = cmd
            .status()
            .with_context(|| format!("Failed to run {}", format_command(&cmd)))?;
        if !status.success() {
            bail!("Building {} failed with {}", self.tag, status);
        }
        Ok(())
    }
}

/// Format a Command for display
pub fn format_command(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy();
    let args: Vec<String> = cmd
        .get_args()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect();
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}
