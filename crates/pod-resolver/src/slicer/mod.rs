//! Per (module, environment) closure computation.
//!
//! The resolver walks requirements breadth-first from the module's reactor
//! units. Each requirement takes up to `max` candidates in the universe's
//! preference order; a unit already in the closure is never expanded twice,
//! which is all the cycle handling mutually requiring units need. Missing
//! mandatory requirements are collected and reported together once the
//! worklist is empty.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use pod_core::error::MissingDependency;
use pod_core::types::{Requirement, TargetEnvironment, Unit, UnitKey, VersionRange};
use pod_core::{PodError, PodResult};

use crate::graph::ResolutionGraph;
use crate::universe::{UniverseEntry, UnitUniverse};

/// How optional requirements are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionalPolicy {
    /// Optional requirements behave like mandatory ones
    #[default]
    Require,
    /// Optional requirements are dropped
    Ignore,
    /// Optional requirements are followed when a match exists and never fail
    Optional,
}

impl FromStr for OptionalPolicy {
    type Err = PodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "require" => Ok(OptionalPolicy::Require),
            "ignore" => Ok(OptionalPolicy::Ignore),
            "optional" => Ok(OptionalPolicy::Optional),
            other => Err(PodError::config(
                "optional-dependencies",
                format!("unknown policy '{}', expected require, ignore or optional", other),
            )),
        }
    }
}

impl fmt::Display for OptionalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptionalPolicy::Require => "require",
            OptionalPolicy::Ignore => "ignore",
            OptionalPolicy::Optional => "optional",
        })
    }
}

/// Resolver configuration shared by every resolution of a build
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    pub optional_policy: OptionalPolicy,
    /// Pinned requirements added to every resolution
    pub extra_requirements: Vec<Requirement>,
    /// Requirements of the execution environment profile
    pub profile_requirements: Vec<Requirement>,
    /// Custom filter properties merged into every environment; they win over
    /// the environment's own properties
    pub filter_properties: BTreeMap<String, String>,
}

impl ResolverConfig {
    pub fn with_optional_policy(mut self, policy: OptionalPolicy) -> Self {
        self.optional_policy = policy;
        self
    }

    pub fn with_extra_requirement(mut self, requirement: Requirement) -> Self {
        self.extra_requirements.push(requirement);
        self
    }

    pub fn with_profile_requirement(mut self, requirement: Requirement) -> Self {
        self.profile_requirements.push(requirement);
        self
    }

    pub fn with_filter_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter_properties.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle of one resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionState {
    NotStarted,
    Expanding,
    Satisfied,
    UnsatisfiedFatal,
}

/// Counters and final state of a finished resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionReport {
    pub state: ResolutionState,
    /// Requirements taken off the worklist
    pub requirements_processed: usize,
    /// Requirements whose filter excluded them from this environment
    pub not_applicable: usize,
    /// Optional requirements dropped by policy or left without a match
    pub optional_skipped: usize,
}

impl ResolutionReport {
    fn new() -> Self {
        Self {
            state: ResolutionState::NotStarted,
            requirements_processed: 0,
            not_applicable: 0,
            optional_skipped: 0,
        }
    }
}

/// Resolved closure of one (module, environment) pair, in discovery order
#[derive(Debug, Clone)]
pub struct DependencyResult {
    environment: TargetEnvironment,
    units: IndexMap<UnitKey, UniverseEntry>,
    graph: ResolutionGraph,
    report: ResolutionReport,
}

impl DependencyResult {
    pub fn environment(&self) -> &TargetEnvironment {
        &self.environment
    }

    /// All resolved units in discovery order
    pub fn units(&self) -> impl Iterator<Item = &Arc<Unit>> {
        self.units.values().map(UniverseEntry::unit)
    }

    /// All resolved units with their partition
    pub fn entries(&self) -> impl Iterator<Item = &UniverseEntry> {
        self.units.values()
    }

    /// Resolved units that are not produced by the current build
    pub fn non_reactor_units(&self) -> impl Iterator<Item = &Arc<Unit>> {
        self.units
            .values()
            .filter(|entry| !entry.is_reactor())
            .map(UniverseEntry::unit)
    }

    /// Resolved units produced by the current build
    pub fn reactor_units(&self) -> impl Iterator<Item = &Arc<Unit>> {
        self.units
            .values()
            .filter(|entry| entry.is_reactor())
            .map(UniverseEntry::unit)
    }

    pub fn keys(&self) -> impl Iterator<Item = &UnitKey> {
        self.units.keys()
    }

    /// Identities of the closure, for order-insensitive comparison
    pub fn key_set(&self) -> BTreeSet<UnitKey> {
        self.units.keys().cloned().collect()
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.units.contains_key(key)
    }

    pub fn get(&self, key: &UnitKey) -> Option<&UniverseEntry> {
        self.units.get(key)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn graph(&self) -> &ResolutionGraph {
        &self.graph
    }

    pub fn report(&self) -> &ResolutionReport {
        &self.report
    }
}

/// Pending requirement and the unit that declared it
struct WorkItem<'a> {
    declared_by: UnitKey,
    requirement: &'a Requirement,
}

/// Mutable state of one resolution
struct Closure<'a> {
    units: IndexMap<UnitKey, &'a UniverseEntry>,
    expanded: HashSet<UnitKey>,
    worklist: VecDeque<WorkItem<'a>>,
    graph: ResolutionGraph,
    missing: Vec<MissingDependency>,
    report: ResolutionReport,
}

impl<'a> Closure<'a> {
    fn new() -> Self {
        Self {
            units: IndexMap::new(),
            expanded: HashSet::new(),
            worklist: VecDeque::new(),
            graph: ResolutionGraph::new(),
            missing: Vec::new(),
            report: ResolutionReport::new(),
        }
    }

    fn transition(&mut self, state: ResolutionState) {
        trace!("Resolution state {:?} -> {:?}", self.report.state, state);
        self.report.state = state;
    }

    /// Queue the requirements of `entry` unless they already were
    fn expand(&mut self, entry: &'a UniverseEntry) {
        let key = entry.key();
        if !self.expanded.insert(key.clone()) {
            return;
        }
        for requirement in entry.unit().required_capabilities() {
            self.worklist.push_back(WorkItem {
                declared_by: key.clone(),
                requirement,
            });
        }
    }
}

/// Computes dependency closures over a read-only universe
#[derive(Debug, Clone)]
pub struct Resolver<'u> {
    universe: &'u UnitUniverse,
    config: ResolverConfig,
}

impl<'u> Resolver<'u> {
    pub fn new(universe: &'u UnitUniverse, config: ResolverConfig) -> Self {
        Self { universe, config }
    }

    pub fn universe(&self) -> &'u UnitUniverse {
        self.universe
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Filter properties of `environment` with the configured custom properties merged in
    pub fn filter_properties(&self, environment: &TargetEnvironment) -> BTreeMap<String, String> {
        let mut properties = environment.to_filter_properties();
        properties.extend(
            self.config
                .filter_properties
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        properties
    }

    /// Resolve the closure of all reactor units of `module`
    pub fn resolve_module(&self, module: &str, environment: &TargetEnvironment) -> PodResult<DependencyResult> {
        let roots = self.universe.reactor_units(module);
        if roots.is_empty() {
            return Err(PodError::UnknownModule {
                module: module.to_string(),
            });
        }

        let keys: Vec<UnitKey> = roots.iter().map(|entry| entry.key()).collect();
        self.resolve_roots(module, &keys, environment)
    }

    /// Resolve the closure of arbitrary universe units
    pub fn resolve_units(&self, roots: &[UnitKey], environment: &TargetEnvironment) -> PodResult<DependencyResult> {
        let label = roots
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        self.resolve_roots(&label, roots, environment)
    }

    fn resolve_roots(
        &self,
        label: &str,
        roots: &[UnitKey],
        environment: &TargetEnvironment,
    ) -> PodResult<DependencyResult> {
        let properties = self.filter_properties(environment);
        let mut closure = Closure::new();

        // Every root must itself be available in this environment
        for root in roots {
            let entry = self.find_root(root, &properties).ok_or_else(|| PodError::MissingRootIdentity {
                root: root.clone(),
                environment: environment.clone(),
            })??;
            closure.graph.add_root(root.clone());
            closure.units.insert(root.clone(), entry);
        }

        closure.transition(ResolutionState::Expanding);

        let seeds: Vec<_> = closure.units.values().copied().collect();
        for entry in seeds {
            closure.expand(entry);
        }

        if let Some(first) = roots.first() {
            for requirement in self
                .config
                .extra_requirements
                .iter()
                .chain(self.config.profile_requirements.iter())
            {
                closure.worklist.push_back(WorkItem {
                    declared_by: first.clone(),
                    requirement,
                });
            }
        }

        while let Some(item) = closure.worklist.pop_front() {
            self.process(&mut closure, item, &properties)?;
        }

        if !closure.missing.is_empty() {
            closure.transition(ResolutionState::UnsatisfiedFatal);
            info!(
                "Resolution of '{}' for {} failed with {} missing requirement(s)",
                label,
                environment,
                closure.missing.len()
            );
            return Err(PodError::UnsatisfiedDependencies {
                module: label.to_string(),
                environment: environment.clone(),
                missing: closure.missing,
            });
        }

        closure.transition(ResolutionState::Satisfied);
        info!(
            "Resolved '{}' for {}: {} unit(s) from {} requirement(s)",
            label,
            environment,
            closure.units.len(),
            closure.report.requirements_processed
        );

        Ok(DependencyResult {
            environment: environment.clone(),
            units: closure
                .units
                .into_iter()
                .map(|(key, entry)| (key, entry.clone()))
                .collect(),
            graph: closure.graph,
            report: closure.report,
        })
    }

    /// Look up a root through its self-identity requirement, so environment
    /// scoping and reactor preference apply to roots as well
    fn find_root(
        &self,
        root: &UnitKey,
        properties: &BTreeMap<String, String>,
    ) -> Option<PodResult<&'u UniverseEntry>> {
        let identity = Requirement::unit(root.id.clone(), VersionRange::exact(root.version.clone()));
        match self.universe.find_matches_with_properties(&identity, properties) {
            Ok(matches) => matches.into_iter().find(|entry| entry.key() == *root).map(Ok),
            Err(err) => Some(Err(err)),
        }
    }

    fn process<'a>(
        &self,
        closure: &mut Closure<'a>,
        item: WorkItem<'a>,
        properties: &BTreeMap<String, String>,
    ) -> PodResult<()>
    where
        'u: 'a,
    {
        let requirement = item.requirement;
        closure.report.requirements_processed += 1;

        if !self.universe.evaluate_filter(requirement.filter.as_deref(), properties)? {
            debug!("Requirement {} of {} does not apply here", requirement, item.declared_by);
            closure.report.not_applicable += 1;
            return Ok(());
        }

        let lenient = match (requirement.optional, self.config.optional_policy) {
            (false, _) | (true, OptionalPolicy::Require) => false,
            (true, OptionalPolicy::Ignore) => {
                debug!("Ignoring optional requirement {} of {}", requirement, item.declared_by);
                closure.report.optional_skipped += 1;
                return Ok(());
            },
            (true, OptionalPolicy::Optional) => true,
        };

        let matches = self.universe.find_matches_with_properties(requirement, properties)?;

        if matches.len() < requirement.min as usize {
            if lenient {
                debug!("Optional requirement {} of {} has no match", requirement, item.declared_by);
                closure.report.optional_skipped += 1;
                return Ok(());
            }
            debug!(
                "Requirement {} of {} has {} of {} needed match(es)",
                requirement,
                item.declared_by,
                matches.len(),
                requirement.min
            );
            closure.missing.push(MissingDependency {
                namespace: requirement.namespace.clone(),
                name: requirement.name.clone(),
                range: requirement.range.clone(),
                filter: requirement.filter.clone(),
                walkback: closure
                    .graph
                    .walkback(&item.declared_by)
                    .into_iter()
                    .map(|key| key.id)
                    .collect(),
            });
            return Ok(());
        }

        for entry in matches.into_iter().take(requirement.max as usize) {
            let key = entry.key();
            let discovered = closure
                .graph
                .add_dependency(&item.declared_by, key.clone(), requirement.clone());
            if discovered {
                debug!("{} selected {} for {}", item.declared_by, key, requirement);
                closure.units.insert(key, entry);
            }
            if requirement.greedy {
                closure.expand(entry);
            }
        }

        Ok(())
    }
}
