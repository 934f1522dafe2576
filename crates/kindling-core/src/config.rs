//! Environment settings and their resolution.
//!
//! Settings are resolved once per run. Later sources win:
//!
//! | Source | Example |
//! |--------|---------|
//! | built-in defaults | `myk8s-docker`, 8, 16, 500, `myk8s` |
//! | TOML file | `vm_name = "dev"` |
//! | environment | `KINDLING_CPUS=4` |
//! | explicit overrides (CLI flags) | `--cpus 4` |
//!
//! A zero or empty value from any source counts as unset.

use crate::error::{CoreError, Result};
use serde::Deserialize;
use std::path::Path;

/// Default Lima VM name.
pub const DEFAULT_VM_NAME: &str = "myk8s-docker";
/// Default kind cluster name.
pub const DEFAULT_CLUSTER_NAME: &str = "myk8s";
/// Default vCPU count.
pub const DEFAULT_CPUS: u32 = 8;
/// Default memory in GiB.
pub const DEFAULT_MEMORY_GIB: u32 = 16;
/// Default disk in GiB.
pub const DEFAULT_DISK_GIB: u32 = 500;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "KINDLING";

/// Resolved, immutable settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Lima VM name.
    pub vm_name: String,
    /// vCPU count.
    pub cpus: u32,
    /// Memory in GiB.
    pub memory_gib: u32,
    /// Disk in GiB.
    pub disk_gib: u32,
    /// kind cluster name.
    pub cluster_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vm_name: DEFAULT_VM_NAME.to_string(),
            cpus: DEFAULT_CPUS,
            memory_gib: DEFAULT_MEMORY_GIB,
            disk_gib: DEFAULT_DISK_GIB,
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
        }
    }
}

/// Partial settings as read from a file, the environment, or flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SettingsOverrides {
    pub vm_name: Option<String>,
    pub cpus: Option<u32>,
    pub memory: Option<u32>,
    pub disk: Option<u32>,
    pub cluster_name: Option<String>,
}

impl SettingsOverrides {
    /// Layer `other` on top of `self`; set values in `other` win.
    pub fn merge(self, other: SettingsOverrides) -> Self {
        Self {
            vm_name: non_empty(other.vm_name).or(non_empty(self.vm_name)),
            cpus: non_zero(other.cpus).or(non_zero(self.cpus)),
            memory: non_zero(other.memory).or(non_zero(self.memory)),
            disk: non_zero(other.disk).or(non_zero(self.disk)),
            cluster_name: non_empty(other.cluster_name).or(non_empty(self.cluster_name)),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn non_zero(v: Option<u32>) -> Option<u32> {
    v.filter(|n| *n != 0)
}

impl Settings {
    /// Resolve settings from an optional TOML file, `KINDLING_*` variables,
    /// and explicit overrides.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, a value has the wrong
    /// type, or the result fails [`Settings::validate`].
    pub fn load(file: Option<&Path>, overrides: SettingsOverrides) -> Result<Self> {
        Self::resolve(file, None, overrides)
    }

    /// `env` replaces the process environment when set.
    fn resolve(
        file: Option<&Path>,
        env: Option<config::Map<String, String>>,
        overrides: SettingsOverrides,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .try_parsing(true)
                .source(env),
        );

        let layered: SettingsOverrides = builder.build()?.try_deserialize()?;
        let settings = Self::from_overrides(layered.merge(overrides));
        settings.validate()?;

        tracing::debug!(?settings, "Settings resolved");
        Ok(settings)
    }

    /// Fill unset values with defaults.
    pub fn from_overrides(o: SettingsOverrides) -> Self {
        let default = Self::default();
        Self {
            vm_name: non_empty(o.vm_name).unwrap_or(default.vm_name),
            cpus: non_zero(o.cpus).unwrap_or(default.cpus),
            memory_gib: non_zero(o.memory).unwrap_or(default.memory_gib),
            disk_gib: non_zero(o.disk).unwrap_or(default.disk_gib),
            cluster_name: non_empty(o.cluster_name).unwrap_or(default.cluster_name),
        }
    }

    /// Check that names are usable as Lima instance and kind cluster names.
    pub fn validate(&self) -> Result<()> {
        validate_name("vm_name", &self.vm_name)?;
        validate_name("cluster_name", &self.cluster_name)?;
        Ok(())
    }

    /// Docker context pointing at the VM (`lima-<vm>`).
    pub fn docker_context(&self) -> String {
        format!("lima-{}", self.vm_name)
    }

    /// kubeconfig context kind creates (`kind-<cluster>`).
    pub fn kube_context(&self) -> String {
        format!("kind-{}", self.cluster_name)
    }

    /// Name of the control-plane node container.
    pub fn control_plane_node(&self) -> String {
        format!("{}-control-plane", self.cluster_name)
    }
}

fn validate_name(field: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(CoreError::Config(format!(
            "{field} must be 1-63 lowercase letters, digits or '-', got {value:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.vm_name, "myk8s-docker");
        assert_eq!(settings.cpus, 8);
        assert_eq!(settings.memory_gib, 16);
        assert_eq!(settings.disk_gib, 500);
        assert_eq!(settings.cluster_name, "myk8s");
        assert_eq!(settings.docker_context(), "lima-myk8s-docker");
        assert_eq!(settings.kube_context(), "kind-myk8s");
        assert_eq!(settings.control_plane_node(), "myk8s-control-plane");
    }

    #[test]
    fn test_zero_and_empty_fall_back_to_defaults() {
        let settings = Settings::from_overrides(SettingsOverrides {
            vm_name: Some("  ".into()),
            cpus: Some(0),
            memory: Some(32),
            disk: None,
            cluster_name: Some(String::new()),
        });
        assert_eq!(settings.vm_name, DEFAULT_VM_NAME);
        assert_eq!(settings.cpus, DEFAULT_CPUS);
        assert_eq!(settings.memory_gib, 32);
        assert_eq!(settings.disk_gib, DEFAULT_DISK_GIB);
        assert_eq!(settings.cluster_name, DEFAULT_CLUSTER_NAME);
    }

    #[test]
    fn test_merge_later_wins_unless_unset() {
        let file = SettingsOverrides {
            vm_name: Some("from-file".into()),
            cpus: Some(4),
            ..Default::default()
        };
        let flags = SettingsOverrides {
            cpus: Some(2),
            memory: Some(0),
            ..Default::default()
        };
        let merged = file.merge(flags);
        assert_eq!(merged.vm_name.as_deref(), Some("from-file"));
        assert_eq!(merged.cpus, Some(2));
        assert_eq!(merged.memory, None);
    }

    #[test]
    fn test_validate_names() {
        assert!(Settings::default().validate().is_ok());

        let bad = Settings {
            cluster_name: "My_Cluster".into(),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(CoreError::Config(_))));

        let bad = Settings {
            vm_name: "-dev".into(),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_load_from_file_with_flag_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "vm_name = \"filevm\"\ncpus = 4\ndisk = 0").unwrap();

        let settings = Settings::resolve(
            Some(file.path()),
            Some(config::Map::new()),
            SettingsOverrides {
                cpus: Some(6),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(settings.vm_name, "filevm");
        assert_eq!(settings.cpus, 6);
        assert_eq!(settings.disk_gib, DEFAULT_DISK_GIB);
    }

    #[test]
    fn test_env_between_file_and_flags() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "vm_name = \"filevm\"\ncpus = 4\nmemory = 8").unwrap();
        let env = config::Map::from([
            ("KINDLING_VM_NAME".to_string(), "envvm".to_string()),
            ("KINDLING_MEMORY".to_string(), "24".to_string()),
            ("KINDLING_CPUS".to_string(), "2".to_string()),
        ]);

        let settings = Settings::resolve(
            Some(file.path()),
            Some(env),
            SettingsOverrides {
                cpus: Some(6),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(settings.vm_name, "envvm");
        assert_eq!(settings.memory_gib, 24);
        assert_eq!(settings.cpus, 6);
        assert_eq!(settings.disk_gib, DEFAULT_DISK_GIB);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = Settings::load(
            Some(Path::new("/nonexistent/kindling.toml")),
            SettingsOverrides::default(),
        );
        assert!(matches!(result, Err(CoreError::Source(_))));
    }
}
