//! Indexed store of reactor and repository units.
//!
//! A universe is assembled once per build through [`UniverseBuilder`] and then
//! frozen into a read-only [`UnitUniverse`] that any number of resolutions can
//! share across threads. Candidate lookup always yields reactor units before
//! repository units, each group in registration order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use pod_core::types::{Requirement, TargetEnvironment, Unit, UnitKey};
use pod_core::{FilterCache, PodError, PodResult};

/// Partition a unit belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitOrigin {
    /// Produced by a module of the current build
    Reactor { module: String },
    /// Previously published
    Repository,
}

/// Unit together with its partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseEntry {
    unit: Arc<Unit>,
    origin: UnitOrigin,
}

impl UniverseEntry {
    pub fn unit(&self) -> &Arc<Unit> {
        &self.unit
    }

    pub fn origin(&self) -> &UnitOrigin {
        &self.origin
    }

    pub fn key(&self) -> UnitKey {
        self.unit.key()
    }

    pub fn is_reactor(&self) -> bool {
        matches!(self.origin, UnitOrigin::Reactor { .. })
    }

    /// Owning module of a reactor unit
    pub fn module(&self) -> Option<&str> {
        match &self.origin {
            UnitOrigin::Reactor { module } => Some(module),
            UnitOrigin::Repository => None,
        }
    }
}

/// Single-writer assembly of a [`UnitUniverse`]
#[derive(Debug, Default)]
pub struct UniverseBuilder {
    reactor: Vec<UniverseEntry>,
    reactor_index: HashMap<UnitKey, usize>,
    repository: Vec<Arc<Unit>>,
    repository_index: HashMap<UnitKey, usize>,
}

impl UniverseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit produced by `module`.
    ///
    /// Fails if another module already produced the same (id, version), or if
    /// the same module registers it again with different content.
    pub fn add_reactor_unit(&mut self, module: impl Into<String>, unit: Unit) -> PodResult<()> {
        let module = module.into();
        let key = unit.key();

        if let Some(&index) = self.reactor_index.get(&key) {
            let existing = &self.reactor[index];
            let existing_module = existing.module().unwrap_or_default();
            if existing_module == module && existing.unit.fingerprint() == unit.fingerprint() {
                debug!("Ignoring duplicate registration of {} by module '{}'", key, module);
                return Ok(());
            }
            return Err(PodError::ReactorContentAmbiguity {
                id: key.id,
                version: key.version.to_string(),
                existing_module: existing_module.to_string(),
                conflicting_module: module,
            });
        }

        self.reactor_index.insert(key, self.reactor.len());
        self.reactor.push(UniverseEntry {
            unit: Arc::new(unit),
            origin: UnitOrigin::Reactor { module },
        });
        Ok(())
    }

    /// Register a previously published unit.
    ///
    /// Identical duplicates are dropped; a duplicate with different content is
    /// a repository inconsistency.
    pub fn add_repository_unit(&mut self, unit: Unit) -> PodResult<()> {
        let key = unit.key();

        if let Some(&index) = self.repository_index.get(&key) {
            let existing = self.repository[index].fingerprint();
            let conflicting = unit.fingerprint();
            if existing == conflicting {
                return Ok(());
            }
            return Err(PodError::RepositoryContentInconsistency {
                id: key.id,
                version: key.version.to_string(),
                existing_fingerprint: existing,
                conflicting_fingerprint: conflicting,
            });
        }

        self.repository_index.insert(key, self.repository.len());
        self.repository.push(Arc::new(unit));
        Ok(())
    }

    /// Register a repository snapshot
    pub fn add_repository_units(&mut self, units: impl IntoIterator<Item = Unit>) -> PodResult<()> {
        units.into_iter().try_for_each(|unit| self.add_repository_unit(unit))
    }

    /// Freeze the universe.
    ///
    /// Repository units shadowed by a reactor unit with the same (id, version)
    /// are left out of every lookup.
    pub fn build(self) -> UnitUniverse {
        let mut entries = self.reactor;
        let reactor_count = entries.len();
        let mut shadowed = Vec::new();

        for unit in self.repository {
            let key = unit.key();
            if self.reactor_index.contains_key(&key) {
                warn!("Repository unit {} is shadowed by the reactor unit of the same identity", key);
                shadowed.push(key);
                continue;
            }
            entries.push(UniverseEntry {
                unit,
                origin: UnitOrigin::Repository,
            });
        }

        let mut by_key = HashMap::with_capacity(entries.len());
        let mut capabilities: HashMap<(String, String), Vec<usize>> = HashMap::new();
        let mut modules: IndexMap<String, Vec<usize>> = IndexMap::new();

        for (index, entry) in entries.iter().enumerate() {
            by_key.insert(entry.key(), index);

            if let Some(module) = entry.module() {
                modules.entry(module.to_string()).or_default().push(index);
            }

            for capability in entry.unit.provided_capabilities() {
                let slot = capabilities
                    .entry((capability.namespace.clone(), capability.name.clone()))
                    .or_default();
                // a unit may provide the same name at several versions
                if slot.last() != Some(&index) {
                    slot.push(index);
                }
            }
        }

        debug!(
            "Assembled universe with {} reactor units, {} repository units ({} shadowed)",
            reactor_count,
            entries.len() - reactor_count,
            shadowed.len()
        );

        UnitUniverse {
            entries,
            reactor_count,
            by_key,
            capabilities,
            modules,
            shadowed,
            filters: FilterCache::new(),
        }
    }
}

/// Read-only universe of reactor and repository units
#[derive(Debug)]
pub struct UnitUniverse {
    /// Reactor entries first, then repository entries, each in registration order
    entries: Vec<UniverseEntry>,
    reactor_count: usize,
    by_key: HashMap<UnitKey, usize>,
    /// (namespace, name) to ascending entry indices
    capabilities: HashMap<(String, String), Vec<usize>>,
    modules: IndexMap<String, Vec<usize>>,
    shadowed: Vec<UnitKey>,
    filters: FilterCache,
}

impl UnitUniverse {
    /// Candidates for `requirement` in `environment`, in preference order
    pub fn find_matches(
        &self,
        requirement: &Requirement,
        environment: &TargetEnvironment,
    ) -> PodResult<Vec<&UniverseEntry>> {
        self.find_matches_with_properties(requirement, &environment.to_filter_properties())
    }

    /// Candidates for `requirement` under an explicit set of filter properties.
    ///
    /// Nothing matches when the requirement's own filter rejects the
    /// properties. Otherwise units whose filter rejects them are dropped, then
    /// units without a capability inside the requirement's range.
    pub fn find_matches_with_properties(
        &self,
        requirement: &Requirement,
        properties: &BTreeMap<String, String>,
    ) -> PodResult<Vec<&UniverseEntry>> {
        if !self.filters.evaluate(requirement.filter.as_deref(), properties)? {
            return Ok(Vec::new());
        }

        let Some(indices) = self
            .capabilities
            .get(&(requirement.namespace.clone(), requirement.name.clone()))
        else {
            return Ok(Vec::new());
        };

        let mut matches = Vec::new();
        for &index in indices {
            let entry = &self.entries[index];
            if !self.filters.evaluate(entry.unit.filter(), properties)? {
                continue;
            }
            if entry.unit.provides_capability(requirement) {
                matches.push(entry);
            }
        }

        Ok(matches)
    }

    /// Evaluate a filter with the universe's parse cache
    pub fn evaluate_filter(&self, filter: Option<&str>, properties: &BTreeMap<String, String>) -> PodResult<bool> {
        Ok(self.filters.evaluate(filter, properties)?)
    }

    /// Look up a unit by identity; the reactor copy wins over a shadowed repository unit
    pub fn get(&self, key: &UnitKey) -> Option<&UniverseEntry> {
        self.by_key.get(key).map(|&index| &self.entries[index])
    }

    /// Seed units of a module in registration order
    pub fn reactor_units(&self, module: &str) -> Vec<&UniverseEntry> {
        self.modules
            .get(module)
            .map(|indices| indices.iter().map(|&index| &self.entries[index]).collect())
            .unwrap_or_default()
    }

    /// Module ids in first-registration order
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// All entries, reactor units first
    pub fn entries(&self) -> impl Iterator<Item = &UniverseEntry> {
        self.entries.iter()
    }

    /// Repository units hidden by a reactor unit of the same identity
    pub fn shadowed_units(&self) -> &[UnitKey] {
        &self.shadowed
    }

    pub fn reactor_len(&self) -> usize {
        self.reactor_count
    }

    pub fn repository_len(&self) -> usize {
        self.entries.len() - self.reactor_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
