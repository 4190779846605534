//! Repository snapshots for Pod
//!
//! A repository snapshot is a JSON index of installable units. This crate
//! defines the index format, loads snapshots from disk and caches the loaded
//! units so several modules of one build share a single read.

pub mod api;
pub mod cache;
pub mod provider;

// Re-export main types
pub use api::{CapabilityRecord, RepositoryIndex, RequirementRecord, UnitRecord};
pub use cache::{CacheEntry, CacheStats, CachedRepository, SnapshotCache};
pub use provider::{FileRepository, RepositoryProvider};

use pod_core::error::PodError;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, PodError>;
