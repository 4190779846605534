//! Core data types for Pod dependency resolution.
//!
//! This module provides the fundamental types used throughout the Pod crates:
//! - Versions, version ranges and match policies
//! - Capabilities, requirements and units
//! - Target environments

pub mod capability;
pub mod environment;
pub mod range;
pub mod unit;
pub mod version;

// Re-export all public types
pub use capability::{
    Capability, Requirement, BUNDLE_NAMESPACE, FEATURE_NAMESPACE, PACKAGE_NAMESPACE, UNIT_ID_NAMESPACE,
};
pub use environment::TargetEnvironment;
pub use range::{MatchPolicy, VersionRange};
pub use unit::{Unit, UnitKey};
pub use version::{Version, VersionError};
