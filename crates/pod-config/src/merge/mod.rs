//! Configuration layering and environment overrides

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use pod_core::error::PodError;
use pod_core::types::TargetEnvironment;
use pod_resolver::OptionalPolicy;

use crate::toml::{EnvironmentSection, PodToml};
use crate::ConfigResult;

/// Name of the build configuration file
pub const CONFIG_FILE: &str = "pod.toml";

/// Prefix of environment variables read as overrides
pub const ENV_PREFIX: &str = "POD_";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Global config file
    Global(Utf8PathBuf),
    /// Project pod.toml file
    ProjectToml(Utf8PathBuf),
    /// Environment variable
    Environment(String),
    /// CLI flag
    CommandLine,
}

impl ConfigSource {
    /// Directory that relative paths in this configuration are resolved against
    pub fn base_dir(&self) -> Option<&Utf8Path> {
        match self {
            ConfigSource::Global(path) | ConfigSource::ProjectToml(path) => path.parent(),
            ConfigSource::Environment(_) | ConfigSource::CommandLine => None,
        }
    }
}

impl ConfigLoader {
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Load the project's pod.toml, searching parent directories
    pub async fn load_project_config(&self) -> ConfigResult<(PodToml, ConfigSource)> {
        let path = self.resolve_config_path(CONFIG_FILE)?;
        if !path.exists() {
            return Err(PodError::config(
                "config",
                "No pod.toml found in current directory or parent directories",
            ));
        }

        debug!("Loading project configuration from {}", path);
        let config = crate::toml::load_from_file(&path).await?;
        Ok((config, ConfigSource::ProjectToml(path)))
    }

    /// Load an explicitly named configuration file
    pub async fn load_config_file(&self, path: &Utf8Path) -> ConfigResult<(PodToml, ConfigSource)> {
        let path = if path.is_absolute() { path.to_path_buf() } else { self.cwd.join(path) };
        let config = crate::toml::load_from_file(&path).await?;
        Ok((config, ConfigSource::ProjectToml(path)))
    }

    /// Find configuration file in project (walks up directory tree)
    pub fn resolve_config_path(&self, filename: &str) -> ConfigResult<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());
        while let Some(dir) = current {
            let candidate = dir.join(filename);
            if candidate.exists() {
                return Ok(candidate);
            }
            current = dir.parent();
        }

        // Path in the working directory even if it doesn't exist
        Ok(self.cwd.join(filename))
    }

    /// Load ~/.pod/config.toml if present
    pub async fn load_global_config(&self) -> ConfigResult<Option<(PodToml, ConfigSource)>> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| PodError::config("home_dir", "Could not determine home directory"))?;

        let path = Utf8PathBuf::try_from(home_dir)
            .map_err(|e| PodError::config("home_dir", format!("Invalid home directory path: {}", e)))?
            .join(".pod")
            .join("config.toml");

        if !path.exists() {
            return Ok(None);
        }
        debug!("Loading global configuration from {}", path);
        let config = crate::toml::load_from_file(&path).await?;
        Ok(Some((config, ConfigSource::Global(path))))
    }
}

/// Configuration layering: global < project < environment < command line
pub struct ConfigLayering;

impl ConfigLayering {
    /// Merge multiple configuration layers
    pub fn merge_configs(
        global_config: Option<PodToml>,
        project_config: PodToml,
        env_overrides: HashMap<String, String>,
        cli_overrides: HashMap<String, String>,
    ) -> ConfigResult<PodToml> {
        let mut merged = project_config;

        if let Some(global) = global_config {
            if merged.environments.is_empty() {
                merged.environments = global.environments;
            }
            for (name, value) in global.filter_properties {
                merged.filter_properties.entry(name).or_insert(value);
            }
            if merged.profile_requirements.is_empty() {
                merged.profile_requirements = global.profile_requirements;
            }
        }

        Self::apply_env_overrides(&mut merged, &env_overrides)?;

        // Command line wins over everything
        Self::apply_cli_overrides(&mut merged, &cli_overrides)?;

        crate::toml::validate_config(&merged)?;
        Ok(merged)
    }

    fn apply_env_overrides(config: &mut PodToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "POD_OPTIONAL_DEPENDENCIES" => {
                    config.resolution.optional_dependencies = parse_policy(key, value)?;
                },
                "POD_ENVIRONMENTS" => {
                    config.environments = parse_environments(key, value)?;
                },
                _ => {
                    // Unknown environment variable, ignore
                },
            }
        }
        Ok(())
    }

    fn apply_cli_overrides(config: &mut PodToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "optional-dependencies" => {
                    config.resolution.optional_dependencies = parse_policy(key, value)?;
                },
                "environments" => {
                    config.environments = parse_environments(key, value)?;
                },
                _ => {
                    // Unknown CLI override, ignore
                },
            }
        }
        Ok(())
    }

    /// Collect POD_* environment variables
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)).collect()
    }
}

fn parse_policy(source: &str, value: &str) -> ConfigResult<OptionalPolicy> {
    value.parse().map_err(|e: PodError| PodError::config(source, e.to_string()))
}

/// Parse "os/ws/arch[/nl]" entries separated by commas
fn parse_environments(source: &str, value: &str) -> ConfigResult<Vec<EnvironmentSection>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<TargetEnvironment>()
                .map(|environment| EnvironmentSection::from(&environment))
                .map_err(|e| PodError::config(source, e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_pod_toml;
    use tempfile::TempDir;

    const PROJECT: &str = r#"
[[environments]]
os = "linux"
ws = "gtk"
arch = "x86_64"

[filter-properties]
shared = "project"

[[modules]]
id = "app"
descriptor = "app/unit.toml"
"#;

    const GLOBAL: &str = r#"
[[environments]]
os = "macosx"
ws = "cocoa"
arch = "aarch64"

[filter-properties]
shared = "global"
only-global = "yes"

[[profile-requirements]]
namespace = "package"
name = "java.lang"
"#;

    fn temp_path(temp_dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_config_path_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_path(&temp_dir);
        let nested = root.join("app").join("src");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(root.join(CONFIG_FILE), PROJECT).await.unwrap();

        let loader = ConfigLoader::new(nested);
        assert_eq!(loader.resolve_config_path(CONFIG_FILE).unwrap(), root.join(CONFIG_FILE));

        let (config, source) = loader.load_project_config().await.unwrap();
        assert_eq!(config.modules[0].id, "app");
        assert_eq!(source, ConfigSource::ProjectToml(root.join(CONFIG_FILE)));
        assert_eq!(source.base_dir(), Some(root.as_path()));
    }

    #[tokio::test]
    async fn test_missing_project_config() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(temp_path(&temp_dir));

        let err = loader.load_project_config().await.unwrap_err();
        assert!(matches!(err, PodError::ConfigValidation { ref field, .. } if field == "config"));
    }

    #[tokio::test]
    async fn test_load_explicit_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_path(&temp_dir);
        tokio::fs::write(root.join("other.toml"), PROJECT).await.unwrap();

        let loader = ConfigLoader::new(root.clone());
        let (config, source) = loader.load_config_file(Utf8Path::new("other.toml")).await.unwrap();
        assert_eq!(config.environments.len(), 1);
        assert_eq!(source, ConfigSource::ProjectToml(root.join("other.toml")));
    }

    #[test]
    fn test_merge_configs() {
        let global = parse_pod_toml(GLOBAL).unwrap();
        let project = parse_pod_toml(PROJECT).unwrap();

        let merged = ConfigLayering::merge_configs(Some(global), project, HashMap::new(), HashMap::new()).unwrap();

        // Project environments are kept
        assert_eq!(merged.target_environments(), vec![TargetEnvironment::new("linux", "gtk", "x86_64")]);
        assert_eq!(merged.filter_properties["shared"], "project");
        assert_eq!(merged.filter_properties["only-global"], "yes");
        assert_eq!(merged.profile_requirements.len(), 1);
    }

    #[test]
    fn test_global_environments_fill_in() {
        let global = parse_pod_toml(GLOBAL).unwrap();
        let project = parse_pod_toml("[[modules]]\nid = \"app\"\ndescriptor = \"unit.toml\"\n").unwrap();

        let merged = ConfigLayering::merge_configs(Some(global), project, HashMap::new(), HashMap::new()).unwrap();
        assert_eq!(merged.target_environments(), vec![TargetEnvironment::new("macosx", "cocoa", "aarch64")]);
    }

    #[test]
    fn test_overrides_precedence() {
        let project = parse_pod_toml(PROJECT).unwrap();

        let env_overrides = HashMap::from([
            ("POD_OPTIONAL_DEPENDENCIES".to_string(), "ignore".to_string()),
            ("POD_ENVIRONMENTS".to_string(), "win32/win32/x86_64, linux/gtk/aarch64".to_string()),
        ]);
        let cli_overrides = HashMap::from([("optional-dependencies".to_string(), "optional".to_string())]);

        let merged = ConfigLayering::merge_configs(None, project, env_overrides, cli_overrides).unwrap();
        assert_eq!(merged.resolution.optional_dependencies, OptionalPolicy::Optional);
        assert_eq!(
            merged.target_environments(),
            vec![
                TargetEnvironment::new("win32", "win32", "x86_64"),
                TargetEnvironment::new("linux", "gtk", "aarch64"),
            ]
        );
    }

    #[test]
    fn test_invalid_override() {
        let project = parse_pod_toml(PROJECT).unwrap();
        let cli_overrides = HashMap::from([("environments".to_string(), "linux/gtk".to_string())]);

        let err = ConfigLayering::merge_configs(None, project, HashMap::new(), cli_overrides).unwrap_err();
        assert!(matches!(err, PodError::ConfigValidation { ref field, .. } if field == "environments"));
    }

    #[test]
    fn test_collect_env_overrides() {
        std::env::set_var("POD_TEST_OVERRIDE", "1");
        std::env::set_var("NOT_POD_TEST_OVERRIDE", "ignored");

        let overrides = ConfigLayering::collect_env_overrides();
        assert!(overrides.contains_key("POD_TEST_OVERRIDE"));
        assert!(!overrides.contains_key("NOT_POD_TEST_OVERRIDE"));

        std::env::remove_var("POD_TEST_OVERRIDE");
        std::env::remove_var("NOT_POD_TEST_OVERRIDE");
    }
}
