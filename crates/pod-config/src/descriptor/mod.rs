//! unit.toml descriptor parsing
//!
//! A descriptor declares one unit in its top-level `[unit]` table, followed by
//! `[properties]`, `[[provides]]` and `[[requires]]`. Modules that produce
//! several units list the extra ones under `[[units]]`.
//!
//! The unit kind selects a decoration step from a fixed lookup table, and
//! advice passed by the caller can add properties, capabilities and
//! requirements to specific units.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pod_core::error::PodError;
use pod_core::types::{
    Capability, Requirement, Unit, UnitKey, Version, BUNDLE_NAMESPACE, FEATURE_NAMESPACE, UNIT_ID_NAMESPACE,
};
use pod_core::Filter;

use crate::toml::RequirementSpec;
use crate::{syntax_error, ConfigResult};

/// Property marking aggregate units with their kind
pub const KIND_PROPERTY: &str = "unit.kind";

/// Kinds of descriptor a module can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    #[default]
    Bundle,
    Feature,
    Product,
    Repository,
    Category,
    /// Taken exactly as written
    Authored,
}

impl UnitKind {
    pub const ALL: [UnitKind; 6] = [
        UnitKind::Bundle,
        UnitKind::Feature,
        UnitKind::Product,
        UnitKind::Repository,
        UnitKind::Category,
        UnitKind::Authored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Bundle => "bundle",
            UnitKind::Feature => "feature",
            UnitKind::Product => "product",
            UnitKind::Repository => "repository",
            UnitKind::Category => "category",
            UnitKind::Authored => "authored",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitKind {
    type Err = PodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnitKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| PodError::config("kind", format!("unknown unit kind '{}'", s)))
    }
}

type Decorator = fn(Unit) -> Unit;

/// Decoration step per kind, one row per `UnitKind::ALL` entry in the same order
static KIND_TABLE: [Decorator; UnitKind::ALL.len()] = [
    decorate_bundle,
    decorate_feature,
    decorate_product,
    decorate_repository,
    decorate_category,
    decorate_authored,
];

fn decorator(kind: UnitKind) -> Decorator {
    KIND_TABLE[kind as usize]
}

fn decorate_bundle(unit: Unit) -> Unit {
    let capability = Capability::new(BUNDLE_NAMESPACE, unit.id(), unit.version().clone());
    unit.provides(capability)
}

fn decorate_feature(unit: Unit) -> Unit {
    let capability = Capability::new(FEATURE_NAMESPACE, unit.id(), unit.version().clone());
    unit.provides(capability)
}

fn decorate_product(unit: Unit) -> Unit {
    unit.with_property(KIND_PROPERTY, UnitKind::Product.as_str())
}

fn decorate_repository(unit: Unit) -> Unit {
    unit.with_property(KIND_PROPERTY, UnitKind::Repository.as_str())
}

fn decorate_category(unit: Unit) -> Unit {
    unit.with_property(KIND_PROPERTY, UnitKind::Category.as_str())
}

fn decorate_authored(unit: Unit) -> Unit {
    unit
}

/// Extra metadata for one unit, supplied by the caller at parse time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Advice {
    pub unit_id: String,
    pub properties: BTreeMap<String, String>,
    pub capabilities: Vec<Capability>,
    pub requirements: Vec<Requirement>,
}

impl Advice {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn applies_to(&self, unit: &Unit) -> bool {
        self.unit_id == unit.id()
    }

    fn apply(&self, mut unit: Unit) -> Unit {
        for (key, value) in &self.properties {
            unit = unit.with_property(key.clone(), value.clone());
        }
        for capability in &self.capabilities {
            unit = unit.provides(capability.clone());
        }
        for requirement in &self.requirements {
            unit = unit.requires(requirement.clone());
        }
        unit
    }
}

#[derive(Debug, Deserialize)]
struct DescriptorFile {
    unit: Option<UnitHeader>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    provides: Vec<ProvidesSpec>,
    #[serde(default)]
    requires: Vec<RequirementSpec>,
    #[serde(default)]
    units: Vec<UnitSection>,
}

#[derive(Debug, Deserialize)]
struct UnitHeader {
    id: String,
    version: Version,
    #[serde(default)]
    kind: UnitKind,
    filter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnitSection {
    id: String,
    version: Version,
    #[serde(default)]
    kind: UnitKind,
    filter: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    provides: Vec<ProvidesSpec>,
    #[serde(default)]
    requires: Vec<RequirementSpec>,
}

#[derive(Debug, Deserialize)]
struct ProvidesSpec {
    #[serde(default = "default_namespace")]
    namespace: String,
    name: String,
    /// Defaults to the unit's own version
    version: Option<Version>,
}

fn default_namespace() -> String {
    UNIT_ID_NAMESPACE.to_string()
}

/// Where a unit section sits in the descriptor text
#[derive(Debug, Clone, Copy)]
enum Site {
    TopLevel,
    Listed(usize),
}

struct Source<'a> {
    location: &'a str,
    content: &'a str,
}

impl Source<'_> {
    fn error_at(&self, offset: Option<usize>, message: impl Into<String>) -> PodError {
        syntax_error(self.location, self.content, offset, message)
    }

    fn section_offset(&self, site: Site) -> Option<usize> {
        match site {
            Site::TopLevel => header_offset(self.content, "[unit]", 0),
            Site::Listed(index) => header_offset(self.content, "[[units]]", index),
        }
    }

    fn requirement_offset(&self, site: Site, index: usize) -> Option<usize> {
        match site {
            Site::TopLevel => header_offset(self.content, "[[requires]]", index),
            Site::Listed(_) => self.section_offset(site),
        }
    }
}

/// Byte offset of the `nth` line consisting of `header`
fn header_offset(content: &str, header: &str, nth: usize) -> Option<usize> {
    let mut offset = 0;
    let mut seen = 0;
    for line in content.split_inclusive('\n') {
        if line.trim() == header {
            if seen == nth {
                return Some(offset + (line.len() - line.trim_start().len()));
            }
            seen += 1;
        }
        offset += line.len();
    }
    None
}

/// Parse a descriptor into units.
///
/// `location` names the descriptor in error messages. Every error is a
/// [`PodError::DescriptorSyntax`] carrying the line and column when known.
pub fn parse_descriptor(content: &str, location: &str, advice: &[Advice]) -> ConfigResult<Vec<Unit>> {
    let source = Source { location, content };

    // First pass with toml_edit for syntax error locations
    content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| source.error_at(e.span().map(|span| span.start), e.message()))?;

    let file: DescriptorFile = toml::from_str(content)
        .map_err(|e| source.error_at(e.span().map(|span| span.start), e.message()))?;

    let mut sections = Vec::with_capacity(file.units.len() + 1);
    match file.unit {
        Some(header) => sections.push((
            Site::TopLevel,
            UnitSection {
                id: header.id,
                version: header.version,
                kind: header.kind,
                filter: header.filter,
                properties: file.properties,
                provides: file.provides,
                requires: file.requires,
            },
        )),
        None if !file.properties.is_empty() || !file.provides.is_empty() || !file.requires.is_empty() => {
            return Err(source.error_at(None, "top-level sections need a [unit] table"));
        },
        None => {},
    }
    sections.extend(
        file.units
            .into_iter()
            .enumerate()
            .map(|(index, section)| (Site::Listed(index), section)),
    );

    if sections.is_empty() {
        return Err(source.error_at(None, "descriptor declares no unit"));
    }

    let mut units: Vec<Unit> = Vec::with_capacity(sections.len());
    for (site, section) in sections {
        let unit = build_unit(&source, site, section, advice)?;
        if units.iter().any(|existing| existing.key() == unit.key()) {
            return Err(source.error_at(
                source.section_offset(site),
                format!("unit {} is declared twice", unit.key()),
            ));
        }
        units.push(unit);
    }

    debug!("Parsed {} unit(s) from {}", units.len(), location);
    Ok(units)
}

fn build_unit(source: &Source<'_>, site: Site, section: UnitSection, advice: &[Advice]) -> ConfigResult<Unit> {
    let offset = source.section_offset(site);
    if section.id.trim().is_empty() {
        return Err(source.error_at(offset, "unit id must not be empty"));
    }

    let mut unit = Unit::new(section.id.trim(), section.version.clone());

    if let Some(filter) = section.filter {
        Filter::parse(&filter).map_err(|e| source.error_at(offset, e.to_string()))?;
        unit = unit.with_filter(filter);
    }

    for (key, value) in section.properties {
        unit = unit.with_property(key, value);
    }

    for provided in section.provides {
        let version = provided.version.unwrap_or_else(|| section.version.clone());
        unit = unit.provides(Capability::new(provided.namespace, provided.name, version));
    }

    for (index, spec) in section.requires.iter().enumerate() {
        let requirement = spec.to_requirement().map_err(|e| {
            source.error_at(
                source.requirement_offset(site, index),
                format!("requirement '{}': {}", spec.name, e),
            )
        })?;
        unit = unit.requires(requirement);
    }

    unit = decorator(section.kind)(unit);

    for item in advice.iter() {
        if item.applies_to(&unit) {
            unit = item.apply(unit);
        }
    }

    Ok(unit)
}

/// Load and parse a descriptor file
pub async fn load_descriptor(path: &Utf8Path, advice: &[Advice]) -> ConfigResult<Vec<Unit>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PodError::io(format!("Failed to read descriptor {}", path), e))?;

    parse_descriptor(&content, path.as_str(), advice)
}

/// Identities declared by a set of parsed units
pub fn unit_keys(units: &[Unit]) -> Vec<UnitKey> {
    units.iter().map(Unit::key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod_core::types::{VersionRange, PACKAGE_NAMESPACE};

    const BUNDLE: &str = r#"
[unit]
id = "app"
version = "1.0.0"

[properties]
vendor = "Example"

[[provides]]
namespace = "package"
name = "org.example.api"

[[requires]]
name = "lib"
version = "1.0.0"
match = "compatible"

[[requires]]
namespace = "package"
name = "org.example.spi"
range = "[1.0,2.0)"
filter = "(os=linux)"
optional = true
greedy = false
"#;

    #[test]
    fn test_parse_bundle() {
        let units = parse_descriptor(BUNDLE, "app/unit.toml", &[]).unwrap();
        assert_eq!(units.len(), 1);
        let unit = &units[0];

        assert_eq!(unit.key(), UnitKey::new("app", Version::new(1, 0, 0)));
        assert_eq!(unit.property("vendor"), Some("Example"));

        let provided: Vec<_> = unit.provided_capabilities().iter().map(ToString::to_string).collect();
        assert_eq!(
            provided,
            vec!["unit-id/app 1.0.0", "package/org.example.api 1.0.0", "bundle/app 1.0.0"]
        );

        let requires = unit.required_capabilities();
        assert_eq!(requires[0].range.to_string(), "[1.0.0,2.0.0)");
        assert_eq!(requires[0].namespace, UNIT_ID_NAMESPACE);
        assert!(!requires[0].optional);
        assert_eq!(requires[1].namespace, PACKAGE_NAMESPACE);
        assert_eq!(requires[1].filter.as_deref(), Some("(os=linux)"));
        assert!(requires[1].optional);
        assert!(!requires[1].greedy);
    }

    #[test]
    fn test_kind_table() {
        let parse = |kind: &str| {
            let content = format!("[unit]\nid = \"x\"\nversion = \"1.0\"\nkind = \"{}\"\n", kind);
            parse_descriptor(&content, "unit.toml", &[]).unwrap().remove(0)
        };

        let feature = parse("feature");
        assert!(feature
            .provided_capabilities()
            .contains(&Capability::new(FEATURE_NAMESPACE, "x", Version::new(1, 0, 0))));

        for kind in ["product", "repository", "category"] {
            assert_eq!(parse(kind).property(KIND_PROPERTY), Some(kind));
        }

        let authored = parse("authored");
        assert_eq!(authored.provided_capabilities().len(), 1);
        assert!(authored.properties().is_empty());

        for (row, kind) in UnitKind::ALL.into_iter().enumerate() {
            assert_eq!(kind as usize, row, "{} is out of table order", kind);
            assert_eq!(kind.as_str().parse::<UnitKind>().unwrap(), kind);
        }

        let bundle = parse("bundle");
        assert!(bundle
            .provided_capabilities()
            .contains(&Capability::new(BUNDLE_NAMESPACE, "x", Version::new(1, 0, 0))));
    }

    #[test]
    fn test_advice_is_explicit() {
        let advice = vec![
            Advice::new("app")
                .with_property("advised", "true")
                .with_requirement(Requirement::unit("extra", VersionRange::UNCONSTRAINED)),
            Advice::new("other").with_property("ignored", "true"),
        ];

        let unit = parse_descriptor(BUNDLE, "unit.toml", &advice).unwrap().remove(0);
        assert_eq!(unit.property("advised"), Some("true"));
        assert_eq!(unit.property("ignored"), None);
        assert_eq!(unit.required_capabilities().last().unwrap().name, "extra");

        // the same descriptor without advice is untouched
        let plain = parse_descriptor(BUNDLE, "unit.toml", &[]).unwrap().remove(0);
        assert_eq!(plain.property("advised"), None);
    }

    #[test]
    fn test_missing_match_policy_is_reported() {
        let content = r#"
[unit]
id = "app"
version = "1.0.0"

[[requires]]
name = "ok"

[[requires]]
name = "lib"
version = "1.2.0"
"#;
        let err = parse_descriptor(content, "app/unit.toml", &[]).unwrap_err();
        match err {
            PodError::DescriptorSyntax { location, line, message, .. } => {
                assert_eq!(location, "app/unit.toml");
                assert_eq!(line, 9);
                assert!(message.contains("'lib'"), "{}", message);
                assert!(message.contains("match policy"), "{}", message);
            },
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_toml_syntax_error_location() {
        let content = "[unit]\nid = \"app\"\nversion = \n";
        let err = parse_descriptor(content, "unit.toml", &[]).unwrap_err();
        assert!(matches!(err, PodError::DescriptorSyntax { line: 3, .. }), "{}", err);
    }

    #[test]
    fn test_invalid_version_is_syntax_error() {
        let content = "[unit]\nid = \"app\"\nversion = \"1.x\"\n";
        let err = parse_descriptor(content, "unit.toml", &[]).unwrap_err();
        assert!(matches!(err, PodError::DescriptorSyntax { line: 3, .. }), "{}", err);
    }

    #[test]
    fn test_invalid_filter_is_syntax_error() {
        let content = "[unit]\nid = \"app\"\nversion = \"1.0\"\nfilter = \"(os=linux\"\n";
        let err = parse_descriptor(content, "unit.toml", &[]).unwrap_err();
        assert!(matches!(err, PodError::DescriptorSyntax { line: 1, .. }), "{}", err);
    }

    #[test]
    fn test_several_units() {
        let content = r#"
[unit]
id = "feature"
version = "1.0.0"
kind = "feature"

[[units]]
id = "feature.source"
version = "1.0.0"
kind = "feature"

[[units.requires]]
name = "feature"
version = "1.0.0"
match = "perfect"
"#;
        let units = parse_descriptor(content, "unit.toml", &[]).unwrap();
        assert_eq!(
            unit_keys(&units),
            vec![
                UnitKey::new("feature", Version::new(1, 0, 0)),
                UnitKey::new("feature.source", Version::new(1, 0, 0))
            ]
        );
        assert!(units[1].required_capabilities()[0].range.is_exact());
    }

    #[test]
    fn test_rejects_empty_and_duplicate_units() {
        assert!(parse_descriptor("", "unit.toml", &[]).is_err());
        assert!(parse_descriptor("[properties]\na = \"b\"\n", "unit.toml", &[]).is_err());

        let duplicate = "[unit]\nid = \"a\"\nversion = \"1.0\"\n\n[[units]]\nid = \"a\"\nversion = \"1.0\"\n";
        let err = parse_descriptor(duplicate, "unit.toml", &[]).unwrap_err();
        assert!(matches!(err, PodError::DescriptorSyntax { line: 5, .. }), "{}", err);
    }

    #[tokio::test]
    async fn test_load_descriptor() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = camino::Utf8PathBuf::try_from(temp_dir.path().join("unit.toml")).unwrap();
        tokio::fs::write(&path, BUNDLE).await.unwrap();

        let units = load_descriptor(&path, &[]).await.unwrap();
        assert_eq!(units[0].id(), "app");

        let missing = load_descriptor(&path.with_file_name("missing.toml"), &[]).await.unwrap_err();
        assert!(matches!(missing, PodError::Io { .. }));
    }
}
