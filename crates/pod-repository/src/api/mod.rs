//! Repository index wire format

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pod_core::error::PodError;
use pod_core::types::{Capability, Requirement, Unit, Version, VersionRange, UNIT_ID_NAMESPACE};
use pod_core::Filter;

use crate::RepositoryResult;

/// Content of a repository snapshot index
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RepositoryIndex {
    /// Human-readable repository name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// When the snapshot was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// All units of the snapshot
    #[serde(default)]
    pub units: Vec<UnitRecord>,
}

/// One unit of a snapshot
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UnitRecord {
    pub id: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    /// Capabilities besides the unit's own identity
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<CapabilityRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<RequirementRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CapabilityRecord {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    pub version: Version,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RequirementRecord {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    /// Interval notation; absent means any version
    #[serde(default = "unconstrained")]
    pub range: VersionRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
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

fn unconstrained() -> VersionRange {
    VersionRange::UNCONSTRAINED
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

impl RepositoryIndex {
    /// Parse index JSON; `location` names the source in errors
    pub fn from_json(content: &str, location: &str) -> RepositoryResult<Self> {
        serde_json::from_str(content).map_err(|e| PodError::DescriptorSyntax {
            location: location.to_string(),
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        })
    }

    pub fn to_json(&self) -> RepositoryResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PodError::config("index", e.to_string()))
    }

    /// Convert all records, failing on the first invalid one
    pub fn to_units(&self) -> RepositoryResult<Vec<Unit>> {
        self.units.iter().map(UnitRecord::to_unit).collect()
    }

    pub fn from_units<'a>(units: impl IntoIterator<Item = &'a Unit>) -> Self {
        Self {
            name: None,
            timestamp: None,
            units: units.into_iter().map(UnitRecord::from).collect(),
        }
    }
}

impl UnitRecord {
    pub fn to_unit(&self) -> RepositoryResult<Unit> {
        let context = |reason: String| PodError::config(format!("units.{}", self.id), reason);

        if self.id.trim().is_empty() {
            return Err(PodError::config("units.id", "unit id must not be empty"));
        }

        let mut unit = Unit::new(self.id.clone(), self.version.clone());
        if let Some(filter) = &self.filter {
            Filter::parse(filter).map_err(|e| context(e.to_string()))?;
            unit = unit.with_filter(filter.clone());
        }
        for (key, value) in &self.properties {
            unit = unit.with_property(key.clone(), value.clone());
        }
        for capability in &self.provides {
            unit = unit.provides(Capability::new(
                capability.namespace.clone(),
                capability.name.clone(),
                capability.version.clone(),
            ));
        }
        for record in &self.requires {
            unit = unit.requires(record.to_requirement().map_err(|e| context(e.to_string()))?);
        }
        Ok(unit)
    }
}

impl RequirementRecord {
    pub fn to_requirement(&self) -> RepositoryResult<Requirement> {
        if self.max == 0 || self.min > self.max {
            return Err(PodError::config(
                "max",
                format!("requirement '{}' needs 1 <= max and min <= max", self.name),
            ));
        }

        let mut requirement = Requirement::new(self.namespace.clone(), self.name.clone(), self.range.clone())
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

impl From<&Unit> for UnitRecord {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id().to_string(),
            version: unit.version().clone(),
            properties: unit.properties().clone(),
            provides: unit
                .provided_capabilities()
                .iter()
                .filter(|capability| !(capability.namespace == UNIT_ID_NAMESPACE && capability.name == unit.id()))
                .map(|capability| CapabilityRecord {
                    namespace: capability.namespace.clone(),
                    name: capability.name.clone(),
                    version: capability.version.clone(),
                })
                .collect(),
            requires: unit
                .required_capabilities()
                .iter()
                .map(|requirement| RequirementRecord {
                    namespace: requirement.namespace.clone(),
                    name: requirement.name.clone(),
                    range: requirement.range.clone(),
                    filter: requirement.filter.clone(),
                    optional: requirement.optional,
                    greedy: requirement.greedy,
                    min: requirement.min,
                    max: requirement.max,
                })
                .collect(),
            filter: unit.filter().map(str::to_string),
        }
    }
}
