//! # pod-cli
//!
//! Minimal build driver for multi-environment dependency resolution.
//!
//! Parses the command line, sets up logging and dispatches to the command
//! handlers. Library errors are formatted with their suggestions before the
//! process exits.

use std::process::ExitCode;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use pod_core::error::PodError;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Resolve module dependencies for every target environment of a build
#[derive(Parser)]
#[command(name = "pod", version, about = "Multi-environment dependency resolver")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Build configuration file (default: nearest pod.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the dependency closure of modules
    Resolve {
        /// Module to resolve; repeat for several (default: all modules)
        #[arg(short, long = "module", value_name = "ID")]
        modules: Vec<String>,

        /// Target environment os/ws/arch[/nl]; replaces the configured list
        #[arg(short, long = "environment", value_name = "ENV")]
        environments: Vec<String>,

        /// Treatment of optional requirements: require, ignore or optional
        #[arg(long, value_name = "POLICY")]
        optional_dependencies: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Validate configuration and universe assembly
    Check,
    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    debug!("Starting pod v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            let formatter = ErrorFormatter::new();
            match err.downcast_ref::<PodError>() {
                Some(pod_error) => eprint!("{}", formatter.format_error(pod_error)),
                None => eprintln!("{}", formatter.format_simple(&format!("{:#}", err))),
            }
            ExitCode::FAILURE
        },
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    // Create Tokio runtime for async loading
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    rt.block_on(async {
        let ctx = CommandContext::new(cli.config)?;
        let code = commands::dispatch_command(cli.command, &ctx).await?;
        Ok(code)
    })
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "pod={level},pod_core={level},pod_config={level},pod_repository={level},pod_resolver={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
