//! Utility functions and helpers.
//!
//! Common functionality used across multiple Pod crates.

pub mod hash;

// Re-export commonly used utilities
pub use hash::ContentHasher;
