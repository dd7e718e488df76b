//! Environment resolution
//!
//! Merges the loaded config layers into a single effective
//! [`EnvironmentDescriptor`]. Precedence is fixed: command-line overrides
//! beat the project layer, which beats the base layer, which beats the
//! built-in defaults. Merging is last-write-wins per variable key; overlay
//! lists concatenate in precedence order so later layers override earlier
//! ones when docker compose applies them.
//!
//! Resolution is pure: it takes loaded layers as values and performs no
//! I/O, so identical inputs always produce identical descriptors.

use super::config::{ConfigLayers, EnvironmentEntry};
use crate::error::{OrodcError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Local or remote execution mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentMode {
    /// Containers run on the local docker daemon
    Local,
    /// Docker control is tunnelled to a remote host over ssh
    Remote {
        /// ssh target, e.g. `deploy@staging.example.com`
        host: String,
    },
}

/// Effective environment handed to every module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    /// Environment name (unique key)
    pub name: String,
    /// Compose project name, used for `-p` and container naming
    pub project: String,
    /// Base directory of the project
    pub base_dir: PathBuf,
    /// Compose overlay files in application order
    pub overlays: Vec<PathBuf>,
    /// Environment variables applied to external invocations
    pub variables: BTreeMap<String, String>,
    /// Execution mode
    pub mode: EnvironmentMode,
}

impl EnvironmentDescriptor {
    pub fn is_remote(&self) -> bool {
        matches!(self.mode, EnvironmentMode::Remote { .. })
    }
}

/// Explicit overrides collected by the dispatcher from CLI flags and
/// process environment variables. Modules never read ambient state.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Extra compose overlays, appended last
    pub extra_overlays: Vec<PathBuf>,
    /// Variable overrides, highest precedence
    pub variables: BTreeMap<String, String>,
    /// Remote host override
    pub remote_host: Option<String>,
    /// Base directory override
    pub base_dir: Option<PathBuf>,
}

/// Resolve `name` against the loaded layers and explicit overrides.
pub fn resolve(
    layers: &ConfigLayers,
    name: &str,
    project: &str,
    overrides: &Overrides,
) -> Result<EnvironmentDescriptor> {
    let entries: Vec<&EnvironmentEntry> = [&layers.builtin, &layers.base, &layers.project]
        .iter()
        .filter_map(|file| file.environments.get(name))
        .collect();

    if entries.is_empty() {
        return Err(OrodcError::UnknownEnvironment(name.to_string()));
    }

    let mut base_dir: Option<PathBuf> = None;
    let mut overlays: Vec<PathBuf> = Vec::new();
    let mut variables: BTreeMap<String, String> = BTreeMap::new();
    let mut remote_host: Option<String> = None;

    for entry in &entries {
        if entry.base_dir.is_some() {
            base_dir = entry.base_dir.clone();
        }
        overlays.extend(entry.compose_files.iter().cloned());
        for (key, value) in &entry.variables {
            variables.insert(key.clone(), value.clone());
        }
        if entry.remote_host.is_some() {
            remote_host = entry.remote_host.clone();
        }
    }

    // project dotenv files sit above the project layer's variables
    for (key, value) in &layers.project_vars {
        variables.insert(key.clone(), value.clone());
    }

    // explicit overrides win
    if let Some(ref dir) = overrides.base_dir {
        base_dir = Some(dir.clone());
    }
    overlays.extend(overrides.extra_overlays.iter().cloned());
    for (key, value) in &overrides.variables {
        variables.insert(key.clone(), value.clone());
    }
    if overrides.remote_host.is_some() {
        remote_host = overrides.remote_host.clone();
    }

    let base_dir = base_dir.ok_or_else(|| OrodcError::InvalidEnvironment {
        name: name.to_string(),
        reason: "missing base_dir".to_string(),
    })?;

    if overlays.is_empty() {
        return Err(OrodcError::InvalidEnvironment {
            name: name.to_string(),
            reason: "no compose overlays configured".to_string(),
        });
    }

    let mode = match remote_host {
        Some(host) => EnvironmentMode::Remote { host },
        None => EnvironmentMode::Local,
    };

    Ok(EnvironmentDescriptor {
        name: name.to_string(),
        project: project.to_string(),
        base_dir,
        overlays,
        variables,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::config::ConfigFile;
    use std::path::Path;

    fn layers_from(base: &str, project: &str) -> ConfigLayers {
        ConfigLayers {
            builtin: ConfigFile::default(),
            base: ConfigFile::parse_str(base).unwrap(),
            project: ConfigFile::parse_str(project).unwrap(),
            project_vars: BTreeMap::new(),
        }
    }

    #[test]
    fn test_overlay_precedence_order() {
        let layers = layers_from(
            "environments:\n  local:\n    base_dir: /app\n    compose_files: [a.yml]\n",
            "environments:\n  local:\n    compose_files: [b.yml]\n",
        );
        let overrides = Overrides {
            extra_overlays: vec![PathBuf::from("c.yml")],
            ..Default::default()
        };
        let descriptor = resolve(&layers, "local", "app", &overrides).unwrap();
        assert_eq!(
            descriptor.overlays,
            vec![
                PathBuf::from("a.yml"),
                PathBuf::from("b.yml"),
                PathBuf::from("c.yml")
            ]
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let layers = layers_from(
            "environments:\n  local:\n    base_dir: /app\n    compose_files: [a.yml]\n    variables: {X: base, Y: base}\n",
            "environments:\n  local:\n    compose_files: [b.yml]\n    variables: {Y: project}\n",
        );
        let overrides = Overrides {
            variables: BTreeMap::from([("Z".to_string(), "cli".to_string())]),
            ..Default::default()
        };
        let first = resolve(&layers, "local", "app", &overrides).unwrap();
        let second = resolve(&layers, "local", "app", &overrides).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_variable_precedence_last_write_wins() {
        let mut layers = layers_from(
            "environments:\n  local:\n    base_dir: /app\n    compose_files: [a.yml]\n    variables: {X: base, Y: base, Z: base}\n",
            "environments:\n  local:\n    variables: {Y: project}\n",
        );
        layers
            .project_vars
            .insert("Z".to_string(), "dotenv".to_string());
        let overrides = Overrides {
            variables: BTreeMap::from([("Z".to_string(), "cli".to_string())]),
            ..Default::default()
        };
        let descriptor = resolve(&layers, "local", "app", &overrides).unwrap();
        assert_eq!(descriptor.variables["X"], "base");
        assert_eq!(descriptor.variables["Y"], "project");
        assert_eq!(descriptor.variables["Z"], "cli");
    }

    #[test]
    fn test_unknown_environment() {
        let layers = layers_from(
            "environments:\n  local:\n    base_dir: /app\n    compose_files: [a.yml]\n",
            "environments: {}\n",
        );
        let err = resolve(&layers, "production", "app", &Overrides::default()).unwrap_err();
        assert!(matches!(err, OrodcError::UnknownEnvironment(name) if name == "production"));
    }

    #[test]
    fn test_missing_base_dir_is_invalid() {
        let layers = layers_from(
            "environments:\n  local:\n    compose_files: [a.yml]\n",
            "environments: {}\n",
        );
        let err = resolve(&layers, "local", "app", &Overrides::default()).unwrap_err();
        assert!(matches!(err, OrodcError::InvalidEnvironment { .. }));
    }

    #[test]
    fn test_empty_overlays_is_invalid() {
        let layers = layers_from(
            "environments:\n  local:\n    base_dir: /app\n",
            "environments: {}\n",
        );
        let err = resolve(&layers, "local", "app", &Overrides::default()).unwrap_err();
        assert!(matches!(err, OrodcError::InvalidEnvironment { .. }));
    }

    #[test]
    fn test_remote_host_enables_remote_mode() {
        let layers = layers_from(
            "environments:\n  staging:\n    base_dir: /srv/app\n    compose_files: [a.yml]\n    remote_host: deploy@staging\n",
            "environments: {}\n",
        );
        let descriptor = resolve(&layers, "staging", "app", &Overrides::default()).unwrap();
        assert!(descriptor.is_remote());
        assert_eq!(
            descriptor.mode,
            EnvironmentMode::Remote {
                host: "deploy@staging".to_string()
            }
        );
        assert_eq!(descriptor.base_dir, Path::new("/srv/app"));
    }

    #[test]
    fn test_override_remote_host_wins() {
        let layers = layers_from(
            "environments:\n  local:\n    base_dir: /app\n    compose_files: [a.yml]\n",
            "environments: {}\n",
        );
        let overrides = Overrides {
            remote_host: Some("ci@builder".to_string()),
            ..Default::default()
        };
        let descriptor = resolve(&layers, "local", "app", &overrides).unwrap();
        assert_eq!(
            descriptor.mode,
            EnvironmentMode::Remote {
                host: "ci@builder".to_string()
            }
        );
    }
}
