//! Command implementations and dispatch logic.
//!
//! Every command starts from the same layered configuration and the unit
//! universe assembled from module descriptors and repository snapshots.

use std::collections::HashMap;
use std::process::ExitCode;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use pod_config::{load_descriptor, ConfigLayering, ConfigLoader, PodToml};
use pod_core::error::PodResult;
use pod_repository::{CachedRepository, FileRepository, RepositoryProvider};
use pod_resolver::{UniverseBuilder, UnitUniverse};

pub mod check;
pub mod resolve;


use crate::output::OutputHandler;
use crate::Commands;

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    /// Explicit configuration file from `--config`
    pub config_path: Option<Utf8PathBuf>,
    pub output: OutputHandler,
}

impl CommandContext {
    pub fn new(config_path: Option<Utf8PathBuf>) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        let cwd = Utf8PathBuf::try_from(cwd).context("Current directory is not valid UTF-8")?;

        Ok(Self {
            cwd,
            config_path,
            output: OutputHandler::new(),
        })
    }
}

/// Configuration and universe of one build
pub struct Workspace {
    pub config: PodToml,
    /// Directory relative paths in the configuration start from
    pub base_dir: Utf8PathBuf,
    pub universe: UnitUniverse,
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> PodResult<ExitCode> {
    match command {
        Commands::Resolve {
            modules,
            environments,
            optional_dependencies,
            format,
        } => {
            let mut overrides = HashMap::new();
            if !environments.is_empty() {
                overrides.insert("environments".to_string(), environments.join(","));
            }
            if let Some(policy) = optional_dependencies {
                overrides.insert("optional-dependencies".to_string(), policy);
            }

            let workspace = load_workspace(ctx, overrides).await?;
            let failures = resolve::execute(&workspace, &modules, format, ctx)?;
            Ok(if failures == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        },
        Commands::Check => {
            let workspace = load_workspace(ctx, HashMap::new()).await?;
            check::execute(&workspace, ctx)?;
            Ok(ExitCode::SUCCESS)
        },
        Commands::Version => {
            show_version(ctx);
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// Load layered configuration: global < project < POD_* variables < flags
pub async fn load_config(
    ctx: &CommandContext,
    cli_overrides: HashMap<String, String>,
) -> PodResult<(PodToml, Utf8PathBuf)> {
    let loader = ConfigLoader::new(ctx.cwd.clone());
    let (project, source) = match &ctx.config_path {
        Some(path) => loader.load_config_file(path).await?,
        None => loader.load_project_config().await?,
    };
    let base_dir = source
        .base_dir()
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|| ctx.cwd.clone());

    let global = loader.load_global_config().await?.map(|(config, _)| config);
    let config = ConfigLayering::merge_configs(global, project, ConfigLayering::collect_env_overrides(), cli_overrides)?;

    Ok((config, base_dir))
}

/// Load configuration, module descriptors and repositories, and assemble the universe
pub async fn load_workspace(ctx: &CommandContext, cli_overrides: HashMap<String, String>) -> PodResult<Workspace> {
    let (config, base_dir) = load_config(ctx, cli_overrides).await?;
    let advice = config.advice()?;

    let mut builder = UniverseBuilder::new();
    for module in &config.modules {
        let path = base_dir.join(&module.descriptor);
        let units = load_descriptor(&path, &advice).await?;
        info!(
            "Module '{}' declares {}",
            module.id,
            pod_config::descriptor::unit_keys(&units)
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        for unit in units {
            builder.add_reactor_unit(module.id.as_str(), unit)?;
        }
    }

    // Repositories listed twice are read once
    let repository = CachedRepository::new(FileRepository::new());
    for section in &config.repositories {
        let location = base_dir.join(&section.location);
        let units = repository.list_units(&location).await?;
        builder.add_repository_units(units)?;
    }

    Ok(Workspace {
        config,
        base_dir,
        universe: builder.build(),
    })
}

fn show_version(ctx: &CommandContext) {
    ctx.output.info(&format!("pod {}", env!("CARGO_PKG_VERSION")));
    ctx.output.detail(&format!("built {} for {}", env!("POD_BUILD_DATE"), env!("POD_BUILD_TARGET")));
}
