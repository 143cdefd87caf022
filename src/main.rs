use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hubops::config::Settings;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the hubops TOML config (defaults to ./hubops.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of writing them to stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Render the secret and config YAML files from their templates
    Materialize(MaterializeArgs),
    /// Upgrade the BinderHub Helm release
    Upgrade(Box<UpgradeArgs>),
    /// Run the Terraform declaration of the Azure infrastructure
    #[command(subcommand)]
    Infra(InfraCommand),
}

#[derive(Subcommand, Debug)]
enum InfraCommand {
    /// Show the changes Terraform would make
    Plan,
    /// Apply the declared infrastructure
    Apply(InfraApplyArgs),
    /// Print the key vault values exported by the declaration
    Outputs(InfraOutputsArgs),
}

#[derive(Args, Debug)]
pub(crate) struct MaterializeArgs {
    /// Keep polling pending service addresses for up to this long (e.g. 2m)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    wait: Duration,

    /// Interval between service address polls while waiting
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    poll_interval: Duration,
}

#[derive(Args, Debug)]
pub(crate) struct UpgradeArgs {
    /// BinderHub name / Helm release name
    #[arg(short = 'n', long)]
    hub_name: Option<String>,

    /// Local Helm chart directory
    #[arg(short = 'z', long)]
    chart_name: Option<PathBuf>,

    /// Kubernetes namespace of the release (defaults to the hub name)
    #[arg(long)]
    namespace: Option<String>,

    /// Name of the Azure Kubernetes Service cluster
    #[arg(short = 'c', long)]
    cluster_name: Option<String>,

    /// Azure resource group
    #[arg(short = 'g', long)]
    resource_group: Option<String>,

    /// Azure subscription for resources
    #[arg(short = 's', long)]
    subscription: Option<String>,

    /// Log in to Azure using a managed system identity
    #[arg(long)]
    identity: bool,

    /// Perform a dry-run upgrade of the Helm chart
    #[arg(long)]
    dry_run: bool,

    /// Add debugging output to the helm upgrade command
    #[arg(long)]
    debug: bool,
}

#[derive(Args, Debug)]
pub(crate) struct InfraApplyArgs {
    /// Skip Terraform's interactive approval
    #[arg(long)]
    auto_approve: bool,
}

#[derive(Args, Debug)]
pub(crate) struct InfraOutputsArgs {
    /// Print sensitive values in full
    #[arg(long)]
    show_secrets: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("hubops error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let settings = Settings::new(cli.config.as_deref()).context("Failed to load configuration")?;
    settings.validate().context("Invalid configuration")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to initialize async runtime")?;
    match cli.command {
        CliCommand::Materialize(args) => {
            runtime.block_on(commands::materialize::run_materialize(&settings, &args))?;
        }
        CliCommand::Upgrade(args) => {
            runtime.block_on(commands::upgrade::run_upgrade(&settings, &args))?;
        }
        CliCommand::Infra(InfraCommand::Plan) => {
            runtime.block_on(commands::infra::run_infra_plan(&settings))?;
        }
        CliCommand::Infra(InfraCommand::Apply(args)) => {
            runtime.block_on(commands::infra::run_infra_apply(&settings, &args))?;
        }
        CliCommand::Infra(InfraCommand::Outputs(args)) => {
            runtime.block_on(commands::infra::run_infra_outputs(&settings, &args))?;
        }
    }
    Ok(())
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
