//! `pod check` command implementation.
//!
//! Loading the workspace already validates configuration, descriptors and
//! universe assembly; this command additionally checks that the resolver can
//! be set up and summarises what was loaded.

use pod_core::error::PodResult;
use pod_resolver::MultiEnvironmentCoordinator;

use super::{CommandContext, Workspace};

/// Summary of a loaded workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub modules: usize,
    pub environments: usize,
    pub reactor_units: usize,
    pub repository_units: usize,
    pub shadowed_units: usize,
}

pub fn execute(workspace: &Workspace, ctx: &CommandContext) -> PodResult<CheckSummary> {
    let summary = summarize(workspace)?;

    ctx.output.success(&format!("Configuration in {} is valid", workspace.base_dir));
    ctx.output.detail(&format!(
        "{} module(s), {} environment(s)",
        summary.modules, summary.environments
    ));
    ctx.output.detail(&format!(
        "{} reactor unit(s), {} repository unit(s)",
        summary.reactor_units, summary.repository_units
    ));
    for key in workspace.universe.shadowed_units() {
        ctx.output.warn(&format!("repository unit {} is shadowed by the reactor", key));
    }

    Ok(summary)
}

pub fn summarize(workspace: &Workspace) -> PodResult<CheckSummary> {
    let config = &workspace.config;
    let coordinator =
        MultiEnvironmentCoordinator::new(&workspace.universe, config.resolver_config()?, config.target_environments())?;

    Ok(CheckSummary {
        modules: config.modules.len(),
        environments: coordinator.environments().len(),
        reactor_units: workspace.universe.reactor_len(),
        repository_units: workspace.universe.repository_len(),
        shadowed_units: workspace.universe.shadowed_units().len(),
    })
}
