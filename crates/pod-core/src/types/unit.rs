//! Units: the dependency-relevant metadata of one component.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{Capability, Requirement, Version};
use crate::utils::ContentHasher;

/// Identity of a unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub id: String,
    pub version: Version,
}

impl UnitKey {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Named, versioned component with provided and required capabilities.
///
/// Every unit provides its own identity capability (`unit-id/<id> <version>`).
/// The constructor adds it, so callers never have to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    id: String,
    version: Version,
    properties: BTreeMap<String, String>,
    provides: Vec<Capability>,
    requires: Vec<Requirement>,
    /// Environment scoping; the unit only exists where this filter holds
    filter: Option<String>,
}

impl Unit {
    /// Create a unit providing only its self-capability
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        let id = id.into();
        let identity = Capability::unit(id.clone(), version.clone());
        Self {
            id,
            version,
            properties: BTreeMap::new(),
            provides: vec![identity],
            requires: Vec::new(),
            filter: None,
        }
    }

    /// Add a provided capability; duplicates are ignored
    pub fn provides(mut self, capability: Capability) -> Self {
        if !self.provides.contains(&capability) {
            self.provides.push(capability);
        }
        self
    }

    /// Append a requirement
    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    /// Set a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Scope this unit to the environments matching `filter`
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn key(&self) -> UnitKey {
        UnitKey::new(self.id.clone(), self.version.clone())
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Provided capabilities, self-capability first
    pub fn provided_capabilities(&self) -> &[Capability] {
        &self.provides
    }

    /// Required capabilities in declaration order
    pub fn required_capabilities(&self) -> &[Requirement] {
        &self.requires
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Check if any provided capability satisfies `requirement` (filter not considered)
    pub fn provides_capability(&self, requirement: &Requirement) -> bool {
        self.provides.iter().any(|capability| requirement.satisfied_by(capability))
    }

    /// Blake3 digest of all content, independent of where the unit came from
    pub fn fingerprint(&self) -> String {
        let mut hasher = ContentHasher::new();
        hasher
            .field(&self.id)
            .field(&self.version.to_string())
            .optional(self.filter.as_deref());

        hasher.field(&self.properties.len().to_string());
        for (key, value) in &self.properties {
            hasher.field(key).field(value);
        }

        hasher.field(&self.provides.len().to_string());
        for capability in &self.provides {
            hasher
                .field(&capability.namespace)
                .field(&capability.name)
                .field(&capability.version.to_string());
        }

        hasher.field(&self.requires.len().to_string());
        for requirement in &self.requires {
            hasher
                .field(&requirement.namespace)
                .field(&requirement.name)
                .field(&requirement.range.to_string())
                .optional(requirement.filter.as_deref())
                .field(&format!(
                    "{}:{}:{}:{}",
                    requirement.optional, requirement.greedy, requirement.min, requirement.max
                ));
        }

        hasher.finish()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VersionRange, PACKAGE_NAMESPACE, UNIT_ID_NAMESPACE};

    fn v(major: u64, minor: u64) -> Version {
        Version::new(major, minor, 0)
    }

    #[test]
    fn test_unit_provides_self_capability() {
        let unit = Unit::new("app", v(1, 0));
        let identity = &unit.provided_capabilities()[0];

        assert_eq!(identity.namespace, UNIT_ID_NAMESPACE);
        assert_eq!(identity.name, "app");
        assert_eq!(identity.version, v(1, 0));
        assert!(unit.provides_capability(&Requirement::unit("app", VersionRange::exact(v(1, 0)))));
    }

    #[test]
    fn test_provided_capabilities_are_deduplicated() {
        let api = Capability::new(PACKAGE_NAMESPACE, "org.example.api", v(1, 0));
        let unit = Unit::new("app", v(1, 0))
            .provides(api.clone())
            .provides(api)
            .provides(Capability::unit("app", v(1, 0)));

        assert_eq!(unit.provided_capabilities().len(), 2);
    }

    #[test]
    fn test_requirements_keep_declaration_order() {
        let unit = Unit::new("app", v(1, 0))
            .requires(Requirement::unit("b", VersionRange::UNCONSTRAINED))
            .requires(Requirement::unit("a", VersionRange::UNCONSTRAINED));

        let names: Vec<_> = unit.required_capabilities().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_key_display() {
        let unit = Unit::new("lib", Version::with_qualifier(1, 5, 0, "final"));
        assert_eq!(unit.key().to_string(), "lib@1.5.0.final");
        assert_eq!(unit.to_string(), "lib@1.5.0.final");
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let base = Unit::new("x", v(1, 0));
        let same = Unit::new("x", v(1, 0));
        let marked = Unit::new("x", v(1, 0)).with_property("marker", "reactor");
        let filtered = Unit::new("x", v(1, 0)).with_filter("(os=linux)");
        let requiring = Unit::new("x", v(1, 0)).requires(Requirement::unit("y", VersionRange::UNCONSTRAINED));

        assert_eq!(base.fingerprint(), same.fingerprint());
        assert_ne!(base.fingerprint(), marked.fingerprint());
        assert_ne!(base.fingerprint(), filtered.fingerprint());
        assert_ne!(base.fingerprint(), requiring.fingerprint());
        assert_ne!(
            requiring.fingerprint(),
            Unit::new("x", v(1, 0))
                .requires(Requirement::unit("y", VersionRange::UNCONSTRAINED).optional())
                .fingerprint()
        );
    }
}
