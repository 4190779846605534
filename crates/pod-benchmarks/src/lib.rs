//! Pod benchmarking suite
//!
//! Benchmarks for universe lookup, closure resolution across environments
//! and descriptor parsing.

pub mod common;

pub use common::*;
