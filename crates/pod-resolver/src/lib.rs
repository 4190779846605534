//! Dependency resolution engine for Pod
//!
//! This crate turns a universe of reactor and repository units into the
//! dependency closure of each module, once per target environment, and
//! checks that environment-independent modules resolve identically everywhere.
//!
//! Resolution is a deterministic breadth-first closure, not a search: every
//! requirement takes its candidates in preference order (reactor units first)
//! and failures accumulate until the worklist is empty.

pub mod coordinator;
pub mod graph;
pub mod slicer;
pub mod universe;

// Re-export main types
pub use coordinator::{CoordinatedResult, ModuleKindPolicy, MultiEnvironmentCoordinator};
pub use graph::ResolutionGraph;
pub use slicer::{
    DependencyResult, OptionalPolicy, ResolutionReport, ResolutionState, Resolver, ResolverConfig,
};
pub use universe::{UniverseBuilder, UniverseEntry, UnitOrigin, UnitUniverse};

use pod_core::error::PodError;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, PodError>;
