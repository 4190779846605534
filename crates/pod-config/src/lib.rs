//! Configuration parsing for Pod
//!
//! This crate handles parsing and validation of pod.toml build configuration
//! and unit.toml descriptors, turning both into the types the resolver
//! consumes.

pub mod descriptor;
pub mod merge;
pub mod toml;

// Re-export main types
pub use descriptor::{load_descriptor, parse_descriptor, Advice, UnitKind};
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use self::toml::{
    parse_pod_toml, AdviceSection, EnvironmentSection, ModuleSection, PodToml, RepositorySection, RequirementSpec,
};

use pod_core::error::PodError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, PodError>;

/// Syntax error at a byte offset of `content`, reported with 1-based line and column
pub(crate) fn syntax_error(
    location: &str,
    content: &str,
    offset: Option<usize>,
    message: impl Into<String>,
) -> PodError {
    let (line, column) = offset
        .map(|offset| line_column(content, offset))
        .unwrap_or((0, 0));
    PodError::DescriptorSyntax {
        location: location.to_string(),
        line,
        column,
        message: message.into(),
    }
}

pub(crate) fn line_column(content: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(content.len());
    let before = content.get(..offset).unwrap_or(content);
    let line = before.matches('\n').count() + 1;
    let column = before
        .rfind('\n')
        .map(|newline| before[newline + 1..].chars().count())
        .unwrap_or_else(|| before.chars().count())
        + 1;
    (line, column)
}
