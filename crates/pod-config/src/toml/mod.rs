//! pod.toml build configuration parsing

use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use pod_core::error::PodError;
use pod_core::types::{Capability, MatchPolicy, Requirement, TargetEnvironment, Version, VersionRange, UNIT_ID_NAMESPACE};
use pod_core::Filter;
use pod_resolver::{ModuleKindPolicy, OptionalPolicy, ResolverConfig};

use crate::descriptor::{Advice, UnitKind};
use crate::{syntax_error, ConfigResult};

/// Complete pod.toml configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PodToml {
    /// Resolution policy
    #[serde(default)]
    pub resolution: ResolutionSection,

    /// Target environments, resolved in this order
    #[serde(default)]
    pub environments: Vec<EnvironmentSection>,

    /// Custom properties merged into every environment
    #[serde(default, rename = "filter-properties")]
    pub filter_properties: BTreeMap<String, String>,

    /// Pinned requirements added to every resolution
    #[serde(default, rename = "extra-requirements")]
    pub extra_requirements: Vec<RequirementSpec>,

    /// Execution environment profile requirements
    #[serde(default, rename = "profile-requirements")]
    pub profile_requirements: Vec<RequirementSpec>,

    /// Modules of the build, in build order
    #[serde(default)]
    pub modules: Vec<ModuleSection>,

    /// Repository snapshots
    #[serde(default)]
    pub repositories: Vec<RepositorySection>,

    /// Extra metadata attached to descriptor units while parsing
    #[serde(default)]
    pub advice: Vec<AdviceSection>,
}

/// [resolution] section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolutionSection {
    #[serde(default, rename = "optional-dependencies")]
    pub optional_dependencies: OptionalPolicy,

    /// Module kinds whose closures may differ per environment
    #[serde(default, rename = "allow-conflicting-dependencies")]
    pub allow_conflicting_dependencies: Vec<UnitKind>,
}

/// [[environments]] entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSection {
    pub os: String,
    pub ws: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nl: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// [[modules]] entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSection {
    pub id: String,
    #[serde(default)]
    pub kind: UnitKind,
    /// Path of the module's unit.toml, relative to pod.toml
    pub descriptor: Utf8PathBuf,
}

/// [[repositories]] entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySection {
    /// Path of the repository index, relative to pod.toml
    pub location: Utf8PathBuf,
}

/// [[advice]] entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceSection {
    /// Id of the unit the advice targets
    pub unit: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub provides: Vec<CapabilitySpec>,
    #[serde(default)]
    pub requires: Vec<RequirementSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    pub version: Version,
}

impl AdviceSection {
    pub fn to_advice(&self) -> ConfigResult<Advice> {
        if self.unit.trim().is_empty() {
            return Err(PodError::config("advice.unit", "advice must name a unit"));
        }

        let mut advice = Advice::new(self.unit.trim());
        for (key, value) in &self.properties {
            advice = advice.with_property(key.clone(), value.clone());
        }
        for capability in &self.provides {
            advice = advice.with_capability(Capability::new(
                capability.namespace.clone(),
                capability.name.clone(),
                capability.version.clone(),
            ));
        }
        for spec in &self.requires {
            advice = advice.with_requirement(spec.to_requirement()?);
        }
        Ok(advice)
    }
}

/// Requirement as written in pod.toml or a unit descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementSpec {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    pub name: String,

    /// Base version, widened by `match`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_policy: Option<MatchPolicy>,

    /// Explicit interval, exclusive with `version`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    #[serde(default)]
    pub optional: bool,

    #[serde(default = "default_true")]
    pub greedy: bool,

    #[serde(default = "default_one")]
    pub min: u32,

    #[serde(default = "default_one")]
    pub max: u32,
}

fn default_namespace() -> String {
    UNIT_ID_NAMESPACE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

impl RequirementSpec {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: None,
            match_policy: None,
            range: None,
            filter: None,
            optional: false,
            greedy: true,
            min: 1,
            max: 1,
        }
    }

    /// Convert into a resolver requirement
    pub fn to_requirement(&self) -> ConfigResult<Requirement> {
        if self.name.trim().is_empty() {
            return Err(PodError::config("name", "requirement name must not be empty"));
        }

        let range = match (&self.range, &self.version) {
            (Some(_), Some(_)) => {
                return Err(PodError::config(
                    "range",
                    format!("requirement '{}' sets both range and version", self.name),
                ))
            },
            (Some(range), None) => VersionRange::parse(range)?,
            (None, version) => VersionRange::from_declaration(version.as_deref(), self.match_policy)?,
        };

        if self.max == 0 || self.min > self.max {
            return Err(PodError::config(
                "max",
                format!("requirement '{}' needs 1 <= max and min <= max", self.name),
            ));
        }

        let mut requirement = Requirement::new(self.namespace.clone(), self.name.trim(), range)
            .with_multiplicity(self.min, self.max);
        if let Some(filter) = &self.filter {
            Filter::parse(filter)?;
            requirement = requirement.with_filter(filter.clone());
        }
        if self.optional {
            requirement = requirement.optional();
        }
        if !self.greedy {
            requirement = requirement.non_greedy();
        }
        Ok(requirement)
    }
}

impl EnvironmentSection {
    pub fn to_environment(&self) -> TargetEnvironment {
        let mut environment = TargetEnvironment::new(self.os.clone(), self.ws.clone(), self.arch.clone());
        if let Some(nl) = &self.nl {
            environment = environment.with_nl(nl.clone());
        }
        for (key, value) in &self.properties {
            environment = environment.with_property(key.clone(), value.clone());
        }
        environment
    }
}

impl From<&TargetEnvironment> for EnvironmentSection {
    fn from(environment: &TargetEnvironment) -> Self {
        Self {
            os: environment.os.clone(),
            ws: environment.ws.clone(),
            arch: environment.arch.clone(),
            nl: environment.nl.clone(),
            properties: environment.extra.clone(),
        }
    }
}

impl PodToml {
    /// Target environments in configured order
    pub fn target_environments(&self) -> Vec<TargetEnvironment> {
        self.environments.iter().map(EnvironmentSection::to_environment).collect()
    }

    /// Resolver configuration for this build
    pub fn resolver_config(&self) -> ConfigResult<ResolverConfig> {
        Ok(ResolverConfig {
            optional_policy: self.resolution.optional_dependencies,
            extra_requirements: self
                .extra_requirements
                .iter()
                .map(RequirementSpec::to_requirement)
                .collect::<ConfigResult<_>>()?,
            profile_requirements: self
                .profile_requirements
                .iter()
                .map(RequirementSpec::to_requirement)
                .collect::<ConfigResult<_>>()?,
            filter_properties: self.filter_properties.clone(),
        })
    }

    /// Module kinds allowed to resolve differently per environment
    pub fn kind_policy(&self) -> ModuleKindPolicy {
        self.resolution
            .allow_conflicting_dependencies
            .iter()
            .map(UnitKind::as_str)
            .collect()
    }

    /// Advice to pass to the descriptor parser
    pub fn advice(&self) -> ConfigResult<Vec<Advice>> {
        self.advice.iter().map(AdviceSection::to_advice).collect()
    }

    pub fn module(&self, id: &str) -> Option<&ModuleSection> {
        self.modules.iter().find(|module| module.id == id)
    }
}

/// Parse TOML string to PodToml configuration
pub fn parse_pod_toml(content: &str) -> ConfigResult<PodToml> {
    parse_located(content, "pod.toml")
}

fn parse_located(content: &str, location: &str) -> ConfigResult<PodToml> {
    // First try with toml_edit for better error reporting
    content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| syntax_error(location, content, e.span().map(|span| span.start), e.message()))?;

    // Then parse with serde for type safety
    let config: PodToml = toml::from_str(content)
        .map_err(|e| syntax_error(location, content, e.span().map(|span| span.start), e.message()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Validate configuration consistency
pub fn validate_config(config: &PodToml) -> ConfigResult<()> {
    for (index, environment) in config.environments.iter().enumerate() {
        for (field, value) in [("os", &environment.os), ("ws", &environment.ws), ("arch", &environment.arch)] {
            if value.trim().is_empty() {
                return Err(PodError::config(
                    format!("environments[{}].{}", index, field),
                    "must not be empty",
                ));
            }
        }
    }

    if config.filter_properties.keys().any(|key| key.trim().is_empty()) {
        return Err(PodError::config("filter-properties", "property names must not be empty"));
    }

    let mut module_ids = BTreeSet::new();
    for module in &config.modules {
        if module.id.trim().is_empty() {
            return Err(PodError::config("modules.id", "module id must not be empty"));
        }
        if !module_ids.insert(module.id.as_str()) {
            return Err(PodError::config(
                "modules.id",
                format!("module '{}' is declared twice", module.id),
            ));
        }
    }

    for spec in config.extra_requirements.iter().chain(config.profile_requirements.iter()) {
        spec.to_requirement()?;
    }
    config.advice()?;

    Ok(())
}

/// Load and parse pod.toml from file path
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<PodToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PodError::io(format!("Failed to read {}", path), e))?;

    parse_located(&content, path.as_str()).map_err(|e| match e {
        PodError::ConfigValidation { field, reason } => PodError::ConfigValidation {
            field,
            reason: format!("{} (in {})", reason, path),
        },
        other => other,
    })
}
