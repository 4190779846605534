//! Error message formatting with actionable suggestions.

use std::error::Error;

use pod_core::error::PodError;

use super::colors::ColorSupport;

/// Error formatter with suggestions
pub struct ErrorFormatter {
    colors: ColorSupport,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self::with_colors(ColorSupport::detect())
    }

    pub fn with_colors(colors: ColorSupport) -> Self {
        Self { colors }
    }

    /// Format an error with its location, suggestion and source chain
    pub fn format_error(&self, error: &PodError) -> String {
        let mut output = String::new();

        output.push_str(&self.colors.red("error"));
        output.push_str(": ");
        output.push_str(&error.to_string());
        output.push('\n');

        if let PodError::DescriptorSyntax { location, line, column, .. } = error {
            if *line > 0 {
                output.push_str(&self.format_location(location, *line, *column));
                output.push('\n');
            }
        }

        if let Some(suggestion) = error.suggestion() {
            output.push_str(&self.colors.dim("help"));
            output.push_str(": ");
            output.push_str(suggestion);
            output.push('\n');
        }

        let mut source = error.source();
        while let Some(err) = source {
            output.push_str(&self.colors.dim("caused by"));
            output.push_str(": ");
            output.push_str(&err.to_string());
            output.push('\n');
            source = err.source();
        }

        output
    }

    pub fn format_simple(&self, message: &str) -> String {
        format!("{}: {}", self.colors.red("error"), message)
    }

    pub fn format_location(&self, file: &str, line: usize, column: usize) -> String {
        format!("  {} {}:{}:{}", self.colors.dim("-->"), file, line, column)
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter() -> ErrorFormatter {
        ErrorFormatter::with_colors(ColorSupport::disabled())
    }

    #[test]
    fn test_descriptor_error_shows_location() {
        let error = PodError::DescriptorSyntax {
            location: "app/unit.toml".to_string(),
            line: 9,
            column: 1,
            message: "bad range".to_string(),
        };

        let text = formatter().format_error(&error);
        assert!(text.starts_with("error: Malformed descriptor app/unit.toml:9:1"));
        assert!(text.contains("--> app/unit.toml:9:1"));
        assert!(text.contains("help: "));
    }

    #[test]
    fn test_source_chain_is_listed() {
        let error = PodError::io(
            "Failed to read pod.toml".to_string(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );

        let text = formatter().format_error(&error);
        assert!(text.contains("caused by: no such file"));
    }
}
