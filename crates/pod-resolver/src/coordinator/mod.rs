//! Resolution of one module across all target environments.
//!
//! Most modules produce one environment-independent artifact, so their
//! closures must be identical in every environment. Aggregating modules
//! (repositories, products) may bundle different content per platform and get
//! their per-environment results back unmerged.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{info, warn};

use pod_core::error::EnvironmentDivergence;
use pod_core::types::TargetEnvironment;
use pod_core::{PodError, PodResult};

use crate::slicer::{DependencyResult, Resolver, ResolverConfig};
use crate::universe::UnitUniverse;

/// Outcome of a multi-environment resolution
#[derive(Debug, Clone)]
pub enum CoordinatedResult {
    /// Identical closure in every environment
    Shared(DependencyResult),
    /// Closure per environment, in configured order
    PerEnvironment(IndexMap<TargetEnvironment, DependencyResult>),
}

impl CoordinatedResult {
    pub fn is_shared(&self) -> bool {
        matches!(self, CoordinatedResult::Shared(_))
    }

    pub fn shared(&self) -> Option<&DependencyResult> {
        match self {
            CoordinatedResult::Shared(result) => Some(result),
            CoordinatedResult::PerEnvironment(_) => None,
        }
    }

    /// Result that applies to `environment`; a shared result applies everywhere
    pub fn for_environment(&self, environment: &TargetEnvironment) -> Option<&DependencyResult> {
        match self {
            CoordinatedResult::Shared(result) => Some(result),
            CoordinatedResult::PerEnvironment(results) => results.get(environment),
        }
    }
}

/// Module kinds whose closures may differ between environments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleKindPolicy {
    allow_conflicting: BTreeSet<String>,
}

impl ModuleKindPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, kind: impl Into<String>) -> Self {
        self.allow_conflicting.insert(kind.into());
        self
    }

    pub fn allows_conflicting(&self, kind: &str) -> bool {
        self.allow_conflicting.contains(kind)
    }
}

impl<S: Into<String>> FromIterator<S> for ModuleKindPolicy {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            allow_conflicting: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Runs the resolver across every configured environment
#[derive(Debug, Clone)]
pub struct MultiEnvironmentCoordinator<'u> {
    resolver: Resolver<'u>,
    environments: Vec<TargetEnvironment>,
    kind_policy: ModuleKindPolicy,
}

impl<'u> MultiEnvironmentCoordinator<'u> {
    /// Create a coordinator; duplicate environments are resolved once
    pub fn new(
        universe: &'u UnitUniverse,
        config: ResolverConfig,
        environments: Vec<TargetEnvironment>,
    ) -> PodResult<Self> {
        let mut unique: Vec<TargetEnvironment> = Vec::with_capacity(environments.len());
        for environment in environments {
            if !unique.contains(&environment) {
                unique.push(environment);
            }
        }

        if unique.is_empty() {
            return Err(PodError::config("environments", "at least one target environment is required"));
        }

        Ok(Self {
            resolver: Resolver::new(universe, config),
            environments: unique,
            kind_policy: ModuleKindPolicy::default(),
        })
    }

    pub fn with_kind_policy(mut self, kind_policy: ModuleKindPolicy) -> Self {
        self.kind_policy = kind_policy;
        self
    }

    pub fn environments(&self) -> &[TargetEnvironment] {
        &self.environments
    }

    pub fn resolver(&self) -> &Resolver<'u> {
        &self.resolver
    }

    /// Resolve a module whose kind decides whether divergence is allowed
    pub fn resolve_module_of_kind(&self, module: &str, kind: &str) -> PodResult<CoordinatedResult> {
        self.resolve(module, self.kind_policy.allows_conflicting(kind))
    }

    /// Resolve `module` in every environment.
    ///
    /// With `allow_conflicting` unset, every environment must yield the same
    /// set of units and the first environment's result is returned.
    pub fn resolve(&self, module: &str, allow_conflicting: bool) -> PodResult<CoordinatedResult> {
        let outcomes: Vec<PodResult<DependencyResult>> = self
            .environments
            .par_iter()
            .map(|environment| self.resolver.resolve_module(module, environment))
            .collect();

        // Report the first failure in configured order
        let results = outcomes.into_iter().collect::<PodResult<Vec<_>>>()?;

        if allow_conflicting {
            info!("Resolved '{}' separately for {} environment(s)", module, results.len());
            return Ok(CoordinatedResult::PerEnvironment(
                results
                    .into_iter()
                    .map(|result| (result.environment().clone(), result))
                    .collect(),
            ));
        }

        let divergences = divergences(&results);
        if !divergences.is_empty() {
            for divergence in &divergences {
                warn!("'{}' diverges for {}", module, divergence);
            }
            return Err(PodError::ConflictingDependencies {
                module: module.to_string(),
                divergences,
            });
        }

        let mut results = results.into_iter();
        match results.next() {
            Some(shared) => {
                info!(
                    "Resolved '{}' identically for {} environment(s)",
                    module,
                    self.environments.len()
                );
                Ok(CoordinatedResult::Shared(shared))
            },
            None => Err(PodError::config("environments", "at least one target environment is required")),
        }
    }
}

/// Differences of every result against the first one
fn divergences(results: &[DependencyResult]) -> Vec<EnvironmentDivergence> {
    let Some((reference, rest)) = results.split_first() else {
        return Vec::new();
    };
    let reference_keys = reference.key_set();

    rest.iter()
        .filter_map(|result| {
            let keys = result.key_set();
            let only_here: Vec<_> = keys.difference(&reference_keys).cloned().collect();
            let missing_here: Vec<_> = reference_keys.difference(&keys).cloned().collect();
            if only_here.is_empty() && missing_here.is_empty() {
                return None;
            }
            Some(EnvironmentDivergence {
                environment: result.environment().clone(),
                reference: reference.environment().clone(),
                only_here,
                missing_here,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::UniverseBuilder;
    use pod_core::types::{Capability, Requirement, Unit, UnitKey, Version, VersionRange, PACKAGE_NAMESPACE};

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    fn linux() -> TargetEnvironment {
        TargetEnvironment::new("linux", "gtk", "x86_64")
    }

    fn win32() -> TargetEnvironment {
        TargetEnvironment::new("win32", "win32", "x86_64")
    }

    fn macos() -> TargetEnvironment {
        TargetEnvironment::new("macosx", "cocoa", "aarch64")
    }

    fn swt(id: &str, os: &str) -> Unit {
        Unit::new(id, v("1.0"))
            .with_filter(format!("(os={})", os))
            .provides(Capability::new(PACKAGE_NAMESPACE, "org.eclipse.swt", v("1.0")))
    }

    /// `ui` needs a platform fragment, `core` does not
    fn platform_universe() -> UnitUniverse {
        let mut builder = UniverseBuilder::new();
        builder
            .add_reactor_unit(
                "ui",
                Unit::new("ui", v("1.0")).requires(Requirement::new(
                    PACKAGE_NAMESPACE,
                    "org.eclipse.swt",
                    VersionRange::UNCONSTRAINED,
                )),
            )
            .unwrap();
        builder
            .add_reactor_unit(
                "core",
                Unit::new("core", v("1.0")).requires(Requirement::unit("lib", VersionRange::UNCONSTRAINED)),
            )
            .unwrap();
        builder
            .add_repository_units(vec![
                swt("swt.gtk", "linux"),
                swt("swt.win32", "win32"),
                swt("swt.cocoa", "macosx"),
                Unit::new("lib", v("1.0")),
            ])
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_identical_environments_share_result() {
        let universe = platform_universe();
        let coordinator =
            MultiEnvironmentCoordinator::new(&universe, ResolverConfig::default(), vec![linux(), win32()]).unwrap();

        let result = coordinator.resolve("core", false).unwrap();
        assert!(result.is_shared());
        let shared = result.shared().unwrap();
        assert_eq!(shared.environment(), &linux());
        assert_eq!(shared.len(), 2);
        assert!(result.for_environment(&win32()).is_some());
    }

    #[test]
    fn test_divergence_is_detected() {
        let universe = platform_universe();
        let coordinator =
            MultiEnvironmentCoordinator::new(&universe, ResolverConfig::default(), vec![linux(), win32(), macos()])
                .unwrap();

        let err = coordinator.resolve("ui", false).unwrap_err();
        let ids: Vec<_> = err.diverging_unit_ids().into_iter().collect();
        assert_eq!(ids, vec!["swt.cocoa", "swt.gtk", "swt.win32"]);

        match err {
            PodError::ConflictingDependencies { module, divergences } => {
                assert_eq!(module, "ui");
                assert_eq!(divergences.len(), 2);
                assert_eq!(divergences[0].environment, win32());
                assert_eq!(divergences[0].reference, linux());
                assert_eq!(divergences[0].only_here, vec![UnitKey::new("swt.win32", v("1.0"))]);
                assert_eq!(divergences[0].missing_here, vec![UnitKey::new("swt.gtk", v("1.0"))]);
            },
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_allowed_divergence_returns_per_environment_map() {
        let universe = platform_universe();
        let coordinator =
            MultiEnvironmentCoordinator::new(&universe, ResolverConfig::default(), vec![win32(), linux()]).unwrap();

        let result = coordinator.resolve("ui", true).unwrap();
        let CoordinatedResult::PerEnvironment(results) = &result else {
            panic!("expected per-environment results");
        };

        let order: Vec<_> = results.keys().cloned().collect();
        assert_eq!(order, vec![win32(), linux()]);
        assert!(results[&linux()].contains(&UnitKey::new("swt.gtk", v("1.0"))));
        assert!(results[&win32()].contains(&UnitKey::new("swt.win32", v("1.0"))));
        assert!(result.shared().is_none());
    }

    #[test]
    fn test_module_kind_policy() {
        let universe = platform_universe();
        let coordinator = MultiEnvironmentCoordinator::new(&universe, ResolverConfig::default(), vec![linux(), win32()])
            .unwrap()
            .with_kind_policy(["repository", "product"].into_iter().collect());

        assert!(coordinator.resolve_module_of_kind("ui", "bundle").is_err());
        assert!(!coordinator.resolve_module_of_kind("ui", "repository").unwrap().is_shared());
    }

    #[test]
    fn test_first_failing_environment_is_reported() {
        let mut builder = UniverseBuilder::new();
        builder
            .add_reactor_unit(
                "app",
                Unit::new("app", v("1.0"))
                    .requires(Requirement::unit("native", VersionRange::UNCONSTRAINED).with_filter("(!(os=linux))")),
            )
            .unwrap();
        let universe = builder.build();

        let coordinator =
            MultiEnvironmentCoordinator::new(&universe, ResolverConfig::default(), vec![linux(), macos(), win32()])
                .unwrap();
        for _ in 0..5 {
            let err = coordinator.resolve("app", false).unwrap_err();
            assert!(matches!(err, PodError::UnsatisfiedDependencies { ref environment, .. } if *environment == macos()));
        }
    }

    #[test]
    fn test_environment_list_validation() {
        let universe = platform_universe();
        let err = MultiEnvironmentCoordinator::new(&universe, ResolverConfig::default(), vec![]).unwrap_err();
        assert!(matches!(err, PodError::ConfigValidation { ref field, .. } if field == "environments"));

        let coordinator =
            MultiEnvironmentCoordinator::new(&universe, ResolverConfig::default(), vec![linux(), linux(), win32()])
                .unwrap();
        assert_eq!(coordinator.environments(), &[linux(), win32()]);
    }
}
