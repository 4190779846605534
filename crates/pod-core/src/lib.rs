//! # pod-core
//!
//! Core types and utilities shared across all Pod crates.
//!
//! This crate provides:
//! - Version, VersionRange and MatchPolicy with OSGi-style range semantics
//! - Capability, Requirement and Unit, the dependency-relevant metadata of a component
//! - TargetEnvironment and the LDAP-style filter evaluator used to scope content per platform
//! - PodError enum for unified error handling
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (Version, Unit, TargetEnvironment, etc.)
//! - `filter`: Filter expression parsing and evaluation
//! - `error`: Error types and result aliases
//! - `utils`: Content fingerprinting helpers

pub mod error;
pub mod filter;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{MissingDependency, PodError, PodResult};
pub use filter::{Filter, FilterCache, FilterError};
pub use types::{
    Capability, MatchPolicy, Requirement, TargetEnvironment, Unit, UnitKey, Version, VersionError,
    VersionRange,
};
