//! Error types and result aliases for Pod operations.
//!
//! Provides a unified error type that covers every failure the resolver can
//! report, each carrying enough structured context (ids, versions, walkback,
//! filter text) to produce a precise message without re-running resolution.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::filter::FilterError;
use crate::types::{TargetEnvironment, UnitKey, VersionError, VersionRange};

/// Unified error type for all Pod operations
#[derive(Error, Debug)]
pub enum PodError {
    // Input errors
    #[error("Malformed descriptor {location}:{line}:{column}: {message}")]
    DescriptorSyntax {
        location: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid filter '{filter}' at offset {position}: {reason}")]
    FilterSyntax {
        filter: String,
        position: usize,
        reason: String,
    },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Universe assembly errors
    #[error(
        "Reactor content ambiguity: {id} {version} is produced by both module '{existing_module}' and module '{conflicting_module}'"
    )]
    ReactorContentAmbiguity {
        id: String,
        version: String,
        existing_module: String,
        conflicting_module: String,
    },

    #[error(
        "Repository content inconsistency: {id} {version} is listed twice with different content ({existing_fingerprint} vs {conflicting_fingerprint})"
    )]
    RepositoryContentInconsistency {
        id: String,
        version: String,
        existing_fingerprint: String,
        conflicting_fingerprint: String,
    },

    // Resolution errors
    #[error("Module '{module}' has no units in the reactor")]
    UnknownModule { module: String },

    #[error("Unit {root} is not available for environment {environment}")]
    MissingRootIdentity {
        root: UnitKey,
        environment: TargetEnvironment,
    },

    #[error(
        "Cannot resolve dependencies of '{module}' for environment {environment}:{}",
        format_missing(.missing)
    )]
    UnsatisfiedDependencies {
        module: String,
        environment: TargetEnvironment,
        missing: Vec<MissingDependency>,
    },

    #[error(
        "Module '{module}' resolves to different dependencies per environment:{}",
        format_divergences(.divergences)
    )]
    ConflictingDependencies {
        module: String,
        divergences: Vec<EnvironmentDivergence>,
    },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Pod operations
pub type PodResult<T> = Result<T, PodError>;

/// A mandatory requirement that found no (or too few) matching units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// Capability namespace of the requirement
    pub namespace: String,
    /// Capability name of the requirement
    pub name: String,
    /// Accepted version range
    pub range: VersionRange,
    /// Requirement filter, if any
    pub filter: Option<String>,
    /// Unit ids from the resolution root to the requiring unit
    pub walkback: Vec<String>,
}

/// Units that differ between one environment and the reference environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDivergence {
    /// Environment whose result differs
    pub environment: TargetEnvironment,
    /// Environment the result was compared against
    pub reference: TargetEnvironment,
    /// Units resolved only in `environment`
    pub only_here: Vec<UnitKey>,
    /// Units resolved in `reference` but not in `environment`
    pub missing_here: Vec<UnitKey>,
}

impl fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.namespace, self.name, self.range)?;
        if let Some(filter) = &self.filter {
            write!(f, " {}", filter)?;
        }
        if !self.walkback.is_empty() {
            write!(f, " (required by {})", self.walkback.join(" -> "))?;
        }
        Ok(())
    }
}

impl fmt::Display for EnvironmentDivergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}:", self.environment, self.reference)?;
        for key in &self.only_here {
            write!(f, " +{}", key)?;
        }
        for key in &self.missing_here {
            write!(f, " -{}", key)?;
        }
        Ok(())
    }
}

fn format_missing(missing: &[MissingDependency]) -> String {
    missing
        .iter()
        .map(|m| format!("\n  missing requirement {}", m))
        .collect()
}

fn format_divergences(divergences: &[EnvironmentDivergence]) -> String {
    divergences
        .iter()
        .map(|d| format!("\n  {}", d))
        .collect()
}

impl PodError {
    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a configuration validation error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error stems from a self-contradictory universe
    pub fn is_assembly_error(&self) -> bool {
        matches!(
            self,
            PodError::ReactorContentAmbiguity { .. } | PodError::RepositoryContentInconsistency { .. }
        )
    }

    /// Missing requirements carried by an unsatisfied resolution
    pub fn missing_dependencies(&self) -> &[MissingDependency] {
        match self {
            PodError::UnsatisfiedDependencies { missing, .. } => missing,
            _ => &[],
        }
    }

    /// Ids of all units that differ between environments
    pub fn diverging_unit_ids(&self) -> BTreeSet<String> {
        match self {
            PodError::ConflictingDependencies { divergences, .. } => divergences
                .iter()
                .flat_map(|d| d.only_here.iter().chain(d.missing_here.iter()))
                .map(|key| key.id.clone())
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            PodError::DescriptorSyntax { .. } => Some("Fix the descriptor at the reported location"),
            PodError::FilterSyntax { .. } => {
                Some("Filters use LDAP syntax, e.g. (&(os=linux)(arch=x86_64))")
            },
            PodError::ReactorContentAmbiguity { .. } => {
                Some("Give each module's units a distinct id or version")
            },
            PodError::RepositoryContentInconsistency { .. } => {
                Some("Remove the stale copy from one of the configured repositories")
            },
            PodError::UnsatisfiedDependencies { .. } => Some(
                "Add a repository providing the missing units, or relax the version ranges listed above",
            ),
            PodError::ConflictingDependencies { .. } => Some(
                "Scope the platform-specific requirements with filters, or allow conflicting dependencies for this module kind",
            ),
            PodError::MissingRootIdentity { .. } => {
                Some("Check the unit's environment filter against the configured environments")
            },
            _ => None,
        }
    }
}

impl From<FilterError> for PodError {
    fn from(err: FilterError) -> Self {
        PodError::FilterSyntax {
            filter: err.filter().to_string(),
            position: err.position(),
            reason: err.reason().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Version;

    fn linux() -> TargetEnvironment {
        TargetEnvironment::new("linux", "gtk", "x86_64")
    }

    #[test]
    fn test_unsatisfied_lists_every_missing_requirement() {
        let missing = vec![
            MissingDependency {
                namespace: "unit-id".to_string(),
                name: "missing1".to_string(),
                range: VersionRange::UNCONSTRAINED,
                filter: None,
                walkback: vec!["app".to_string()],
            },
            MissingDependency {
                namespace: "unit-id".to_string(),
                name: "missing2".to_string(),
                range: VersionRange::UNCONSTRAINED,
                filter: Some("(os=linux)".to_string()),
                walkback: vec!["app".to_string(), "lib".to_string()],
            },
        ];
        let error = PodError::UnsatisfiedDependencies {
            module: "app".to_string(),
            environment: linux(),
            missing,
        };

        let message = error.to_string();
        assert!(message.contains("missing1"));
        assert!(message.contains("missing2"));
        assert!(message.contains("app -> lib"));
        assert_eq!(error.missing_dependencies().len(), 2);
        assert!(error.suggestion().is_some());
    }

    #[test]
    fn test_diverging_unit_ids() {
        let error = PodError::ConflictingDependencies {
            module: "app".to_string(),
            divergences: vec![EnvironmentDivergence {
                environment: TargetEnvironment::new("win32", "win32", "x86_64"),
                reference: linux(),
                only_here: vec![UnitKey::new("swt.win32", Version::new(1, 0, 0))],
                missing_here: vec![UnitKey::new("swt.gtk", Version::new(1, 0, 0))],
            }],
        };

        let ids: Vec<_> = error.diverging_unit_ids().into_iter().collect();
        assert_eq!(ids, vec!["swt.gtk".to_string(), "swt.win32".to_string()]);
        assert!(error.to_string().contains("+swt.win32@1.0.0"));
    }

    #[test]
    fn test_assembly_errors() {
        let error = PodError::ReactorContentAmbiguity {
            id: "x".to_string(),
            version: "1.0.0".to_string(),
            existing_module: "a".to_string(),
            conflicting_module: "b".to_string(),
        };
        assert!(error.is_assembly_error());
        assert!(!PodError::config("environments", "empty").is_assembly_error());
    }

    #[test]
    fn test_filter_error_conversion() {
        let err = crate::filter::Filter::parse("(os=linux").unwrap_err();
        let pod: PodError = err.into();
        assert!(matches!(pod, PodError::FilterSyntax { ref filter, .. } if filter == "(os=linux"));
    }
}
