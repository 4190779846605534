//! Capabilities and requirements.
//!
//! A capability is a named, versioned fact a unit provides. A requirement
//! is a query against capabilities: namespace and name, a version range,
//! an optional filter and the multiplicity of matches it accepts.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Version, VersionRange};

/// Namespace of the self-capability every unit provides
pub const UNIT_ID_NAMESPACE: &str = "unit-id";
/// Namespace of bundle (module) identities
pub const BUNDLE_NAMESPACE: &str = "bundle";
/// Namespace of exported packages
pub const PACKAGE_NAMESPACE: &str = "package";
/// Namespace of feature identities
pub const FEATURE_NAMESPACE: &str = "feature";

/// Named, versioned fact provided by a unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capability {
    pub namespace: String,
    pub name: String,
    pub version: Version,
}

impl Capability {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version,
        }
    }

    /// The identity capability of a unit
    pub fn unit(id: impl Into<String>, version: Version) -> Self {
        Self::new(UNIT_ID_NAMESPACE, id, version)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.namespace, self.name, self.version)
    }
}

/// Query against capabilities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    pub namespace: String,
    pub name: String,
    pub range: VersionRange,
    /// Filter over environment properties; the requirement only applies where it holds
    pub filter: Option<String>,
    pub optional: bool,
    /// Greedy requirements pull the requirements of their matches into the closure
    pub greedy: bool,
    pub min: u32,
    pub max: u32,
}

impl Requirement {
    /// Create a mandatory, greedy requirement for exactly one match
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            range,
            filter: None,
            optional: false,
            greedy: true,
            min: 1,
            max: 1,
        }
    }

    /// Require a unit by id
    pub fn unit(id: impl Into<String>, range: VersionRange) -> Self {
        Self::new(UNIT_ID_NAMESPACE, id, range)
    }

    /// Scope this requirement with an environment filter
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Make this requirement optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Stop this requirement from expanding the requirements of its matches
    pub fn non_greedy(mut self) -> Self {
        self.greedy = false;
        self
    }

    /// Set how many matches are needed and how many are taken
    pub fn with_multiplicity(mut self, min: u32, max: u32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Check if a capability satisfies this requirement, ignoring the filter
    pub fn satisfied_by(&self, capability: &Capability) -> bool {
        capability.namespace == self.namespace
            && capability.name == self.name
            && self.range.contains(&capability.version)
    }

    /// Check if this is a unit-id requirement accepting `id` at `version`
    pub fn is_identity_of(&self, id: &str, version: &Version) -> bool {
        self.namespace == UNIT_ID_NAMESPACE && self.name == id && self.range.contains(version)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.namespace, self.name, self.range)?;
        if let Some(filter) = &self.filter {
            write!(f, " {}", filter)?;
        }
        if self.optional {
            write!(f, " (optional)")?;
        }
        Ok(())
    }
}
