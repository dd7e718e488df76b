//! Layered environment configuration types and loading

use crate::error::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project env files loaded into the project layer, in order.
const PROJECT_ENV_FILES: &[&str] = &[".env", ".env-app", ".env-app.local", ".env.orodc"];

/// One environment entry in a config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentEntry {
    /// Base directory for the environment
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Compose overlay files, in layering order
    #[serde(default)]
    pub compose_files: Vec<PathBuf>,
    /// Environment variables
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Remote docker host (ssh target); absent means local mode
    #[serde(default)]
    pub remote_host: Option<String>,
}

/// A single configuration file (`environments.yml` or `.orodc.yml`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Environments keyed by name
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentEntry>,
}

impl ConfigFile {
    /// Parse a config file from YAML.
    pub fn parse_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// The loaded config layers, lowest precedence first
#[derive(Debug, Clone, Default)]
pub struct ConfigLayers {
    /// Built-in defaults (lowest precedence)
    pub builtin: ConfigFile,
    /// Base configuration from the installed share directory
    pub base: ConfigFile,
    /// Project configuration from the project directory
    pub project: ConfigFile,
    /// Variables from project dotenv files, applied over the project layer
    pub project_vars: BTreeMap<String, String>,
}

/// Loads configuration layers from disk.
///
/// All file I/O lives here; merging the layers is a pure function in the
/// resolver.
pub struct ConfigLoader {
    share_dir: PathBuf,
    project_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(share_dir: PathBuf, project_dir: PathBuf) -> Self {
        Self {
            share_dir,
            project_dir,
        }
    }

    /// Load all config layers. Missing files yield empty layers; the
    /// built-in layer always provides a usable `local` environment.
    pub fn load(&self) -> Result<ConfigLayers> {
        let builtin = self.builtin_layer();

        let base_path = self.share_dir.join("environments.yml");
        let base = self.load_file(&base_path, &self.share_dir.join("compose"))?;

        let project_path = self.project_dir.join(".orodc.yml");
        let project = self.load_file(&project_path, &self.project_dir)?;

        let mut project_vars = BTreeMap::new();
        for name in PROJECT_ENV_FILES {
            let path = self.project_dir.join(name);
            if path.is_file() {
                tracing::debug!("Loading environment file: {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                project_vars.extend(parse_dotenv(&content));
            }
        }

        Ok(ConfigLayers {
            builtin,
            base,
            project,
            project_vars,
        })
    }

    /// Default `local` environment: project dir as base, the installed
    /// share compose file as the single overlay.
    fn builtin_layer(&self) -> ConfigFile {
        let mut environments = BTreeMap::new();
        environments.insert(
            "local".to_string(),
            EnvironmentEntry {
                base_dir: Some(self.project_dir.clone()),
                compose_files: vec![self.share_dir.join("compose").join("compose.yml")],
                variables: BTreeMap::new(),
                remote_host: None,
            },
        );
        ConfigFile { environments }
    }

    fn load_file(&self, path: &Path, overlay_root: &Path) -> Result<ConfigFile> {
        if !path.is_file() {
            return Ok(ConfigFile::default());
        }
        tracing::debug!("Loading config file: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let mut config = ConfigFile::parse_str(&content)?;
        for entry in config.environments.values_mut() {
            qualify_paths(entry, overlay_root);
        }
        Ok(config)
    }
}

/// Resolve relative overlay and base-dir paths against the directory the
/// config file came from, so the merged descriptor carries absolute paths.
fn qualify_paths(entry: &mut EnvironmentEntry, root: &Path) {
    if let Some(ref base) = entry.base_dir {
        if base.is_relative() {
            entry.base_dir = Some(root.join(base));
        }
    }
    for overlay in &mut entry.compose_files {
        if overlay.is_relative() {
            *overlay = root.join(&*overlay);
        }
    }
}

/// Parse dotenv-style content: `KEY=VALUE` lines, `#` comments and blank
/// lines skipped, surrounding single or double quotes stripped.
pub fn parse_dotenv(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        vars.insert(key.to_string(), value.to_string());
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_dotenv() {
        let content = r#"
# comment
DC_ORO_PHP_VERSION=8.3
DC_ORO_NODE_VERSION="20"
QUOTED='single'

not a pair
=missing-key
"#;
        let vars = parse_dotenv(content);
        assert_eq!(vars.get("DC_ORO_PHP_VERSION").unwrap(), "8.3");
        assert_eq!(vars.get("DC_ORO_NODE_VERSION").unwrap(), "20");
        assert_eq!(vars.get("QUOTED").unwrap(), "single");
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_parse_config_file() {
        let yaml = r#"
environments:
  local:
    compose_files:
      - compose.yml
      - compose-pgsql.yml
    variables:
      DC_ORO_MODE: default
  staging:
    base_dir: /srv/app
    compose_files:
      - compose.yml
    remote_host: deploy@staging.example.com
"#;
        let config = ConfigFile::parse_str(yaml).unwrap();
        assert_eq!(config.environments.len(), 2);
        let staging = &config.environments["staging"];
        assert_eq!(
            staging.remote_host.as_deref(),
            Some("deploy@staging.example.com")
        );
        assert_eq!(staging.base_dir.as_deref(), Some(Path::new("/srv/app")));
    }

    #[test]
    fn test_loader_qualifies_relative_overlays() {
        let share = tempdir().unwrap();
        let project = tempdir().unwrap();
        std::fs::write(
            share.path().join("environments.yml"),
            "environments:\n  local:\n    compose_files:\n      - compose.yml\n",
        )
        .unwrap();

        let loader = ConfigLoader::new(
            share.path().to_path_buf(),
            project.path().to_path_buf(),
        );
        let layers = loader.load().unwrap();
        let local = &layers.base.environments["local"];
        assert_eq!(
            local.compose_files[0],
            share.path().join("compose").join("compose.yml")
        );
    }

    #[test]
    fn test_loader_reads_project_env_files_in_order() {
        let share = tempdir().unwrap();
        let project = tempdir().unwrap();
        std::fs::write(project.path().join(".env"), "A=1\nB=1\n").unwrap();
        std::fs::write(project.path().join(".env-app.local"), "B=2\n").unwrap();

        let loader = ConfigLoader::new(
            share.path().to_path_buf(),
            project.path().to_path_buf(),
        );
        let layers = loader.load().unwrap();
        assert_eq!(layers.project_vars.get("A").unwrap(), "1");
        // later file wins
        assert_eq!(layers.project_vars.get("B").unwrap(), "2");
    }

    #[test]
    fn test_missing_files_yield_empty_layers() {
        let share = tempdir().unwrap();
        let project = tempdir().unwrap();
        let loader = ConfigLoader::new(
            share.path().to_path_buf(),
            project.path().to_path_buf(),
        );
        let layers = loader.load().unwrap();
        assert!(layers.base.environments.is_empty());
        assert!(layers.project.environments.is_empty());
        // built-in local environment is always present
        assert!(layers.builtin.environments.contains_key("local"));
    }
}
