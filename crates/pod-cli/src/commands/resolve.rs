//! `pod resolve` command implementation.
//!
//! Resolves each selected module for every target environment, in
//! configured module order. A failing module is reported and the command
//! moves on to the next one; the caller turns the failure count into the
//! exit status.

use serde::Serialize;
use tracing::info;

use pod_config::{ModuleSection, UnitKind};
use pod_core::error::{PodError, PodResult};
use pod_resolver::{CoordinatedResult, DependencyResult, MultiEnvironmentCoordinator, UnitOrigin};

use super::{CommandContext, Workspace};
use crate::output::errors::ErrorFormatter;
use crate::OutputFormat;

/// Machine-readable outcome of one module
#[derive(Debug, Serialize)]
pub struct ModuleReport {
    pub module: String,
    pub kind: UnitKind,
    /// Whether one closure serves every environment; absent on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    pub environments: Vec<EnvironmentReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentReport {
    pub environment: String,
    pub units: Vec<UnitReport>,
}

#[derive(Debug, Serialize)]
pub struct UnitReport {
    pub id: String,
    pub version: String,
    /// Module that builds the unit; absent for repository units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diverging: Vec<String>,
}

/// Resolve the selected modules (all when `selected` is empty); returns the number of failures
pub fn execute(workspace: &Workspace, selected: &[String], format: OutputFormat, ctx: &CommandContext) -> PodResult<usize> {
    let config = &workspace.config;
    let modules = select_modules(&config.modules, selected)?;
    let coordinator =
        MultiEnvironmentCoordinator::new(&workspace.universe, config.resolver_config()?, config.target_environments())?
            .with_kind_policy(config.kind_policy());

    info!(
        "Resolving {} module(s) for {} environment(s)",
        modules.len(),
        coordinator.environments().len()
    );

    let mut reports = Vec::with_capacity(modules.len());
    let mut failures = 0;
    for module in modules {
        let outcome = coordinator.resolve_module_of_kind(&module.id, module.kind.as_str());
        if outcome.is_err() {
            failures += 1;
        }
        match format {
            OutputFormat::Text => print_text(module, &outcome, ctx),
            OutputFormat::Json => reports.push(module_report(module, &outcome)),
        }
    }

    if format == OutputFormat::Json {
        let json =
            serde_json::to_string_pretty(&reports).map_err(|e| PodError::config("format", e.to_string()))?;
        ctx.output.info(&json);
    } else if failures > 0 {
        ctx.output.error(&format!("{} module(s) failed to resolve", failures));
    }

    Ok(failures)
}

/// Modules to resolve, in configured order
fn select_modules<'c>(modules: &'c [ModuleSection], selected: &[String]) -> PodResult<Vec<&'c ModuleSection>> {
    if let Some(unknown) = selected.iter().find(|id| !modules.iter().any(|module| &module.id == *id)) {
        return Err(PodError::config("module", format!("'{}' is not a module of this build", unknown)));
    }

    Ok(modules
        .iter()
        .filter(|module| selected.is_empty() || selected.contains(&module.id))
        .collect())
}

/// Units of the closure other than the module's own
fn closure_units(module: &str, result: &DependencyResult) -> Vec<UnitReport> {
    result
        .entries()
        .filter(|entry| entry.module() != Some(module))
        .map(|entry| UnitReport {
            id: entry.unit().id().to_string(),
            version: entry.unit().version().to_string(),
            module: match entry.origin() {
                UnitOrigin::Reactor { module } => Some(module.clone()),
                UnitOrigin::Repository => None,
            },
        })
        .collect()
}

pub fn module_report(module: &ModuleSection, outcome: &PodResult<CoordinatedResult>) -> ModuleReport {
    let mut report = ModuleReport {
        module: module.id.clone(),
        kind: module.kind,
        shared: None,
        environments: Vec::new(),
        error: None,
    };

    match outcome {
        Ok(CoordinatedResult::Shared(result)) => {
            report.shared = Some(true);
            report.environments.push(EnvironmentReport {
                environment: result.environment().to_string(),
                units: closure_units(&module.id, result),
            });
        },
        Ok(CoordinatedResult::PerEnvironment(results)) => {
            report.shared = Some(false);
            report.environments = results
                .iter()
                .map(|(environment, result)| EnvironmentReport {
                    environment: environment.to_string(),
                    units: closure_units(&module.id, result),
                })
                .collect();
        },
        Err(error) => {
            report.error = Some(ErrorReport {
                message: error.to_string(),
                suggestion: error.suggestion(),
                missing: error.missing_dependencies().iter().map(ToString::to_string).collect(),
                diverging: error.diverging_unit_ids().into_iter().collect(),
            });
        },
    }

    report
}

fn print_text(module: &ModuleSection, outcome: &PodResult<CoordinatedResult>, ctx: &CommandContext) {
    let colors = ctx.output.colors();
    let title = format!("{} ({})", colors.bold(&module.id), module.kind);

    match outcome {
        Ok(CoordinatedResult::Shared(result)) => {
            let units = closure_units(&module.id, result);
            ctx.output.success(&format!("{}: {} unit(s), same for every environment", title, units.len()));
            print_units(&units, "    ", ctx);
        },
        Ok(CoordinatedResult::PerEnvironment(results)) => {
            ctx.output.success(&format!("{}: resolved per environment", title));
            for (environment, result) in results {
                let units = closure_units(&module.id, result);
                ctx.output.info(&format!("  {}: {} unit(s)", environment, units.len()));
                print_units(&units, "    ", ctx);
            }
        },
        Err(error) => {
            ctx.output.error(&title);
            eprint!("{}", ErrorFormatter::with_colors(colors).format_error(error));
        },
    }
}

fn print_units(units: &[UnitReport], indent: &str, ctx: &CommandContext) {
    for unit in units {
        match &unit.module {
            Some(module) => ctx
                .output
                .detail(&format!("{}{}@{} (module {})", indent, unit.id, unit.version, module)),
            None => ctx.output.detail(&format!("{}{}@{}", indent, unit.id, unit.version)),
        }
    }
}
