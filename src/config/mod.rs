//! Configuration management for depcache

pub mod schema;

pub use schema::Config;

use crate::error::{DepcacheError, DepcacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Project-local configuration file name
pub const LOCAL_CONFIG_NAME: &str = ".depcache.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depcache")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depcache")
    }

    /// Get the audit log path
    pub fn audit_log_path() -> PathBuf {
        Self::state_dir().join("audit.log")
    }

    /// Walk up from `start` looking for a project-local `.depcache.toml`
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub async fn load(&self) -> DepcacheResult<Config> {
        self.load_merged(None).await
    }

    /// Load the global configuration with an optional local file merged on top
    pub async fn load_merged(&self, local: Option<&Path>) -> DepcacheResult<Config> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if self.config_path.exists() {
            merge_values(&mut merged, read_value(&self.config_path).await?);
        } else {
            debug!("Config file not found, using defaults");
        }

        if let Some(path) = local {
            debug!("Merging local config: {}", path.display());
            merge_values(&mut merged, read_value(path).await?);
        }

        let origin = local.unwrap_or(&self.config_path);
        merged
            .try_into()
            .map_err(|e: toml::de::Error| DepcacheError::ConfigInvalid {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_value(path: &Path) -> DepcacheResult<toml::Value> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| DepcacheError::io(format!("reading config from {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| DepcacheError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Recursively merge `overlay` into `base`; tables merge key by key, other values replace
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("nonexistent.toml"));

        let config = manager.load().await.unwrap();
        assert_eq!(config.project.manifest, "package.json");
    }

    #[tokio::test]
    async fn local_overrides_global_per_key() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        std::fs::write(
            &global,
            "[installer]\nruntime = \"docker\"\nimage = \"node:18\"\n",
        )
        .unwrap();
        let local = temp.path().join(LOCAL_CONFIG_NAME);
        std::fs::write(&local, "[installer]\nimage = \"node:22\"\n").unwrap();

        let config = ConfigManager::with_path(global)
            .load_merged(Some(&local))
            .await
            .unwrap();

        assert_eq!(config.installer.runtime, "docker");
        assert_eq!(config.installer.image, "node:22");
    }

    #[tokio::test]
    async fn invalid_config_names_file() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        std::fs::write(&global, "[general]\ntrace = \"maybe\"\n").unwrap();

        let err = ConfigManager::with_path(global).load().await.unwrap_err();
        assert!(matches!(err, DepcacheError::ConfigInvalid { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial_test::serial]
    fn paths_follow_xdg_dirs() {
        let temp = TempDir::new().unwrap();
        let prev_config = std::env::var_os("XDG_CONFIG_HOME");
        let prev_state = std::env::var_os("XDG_STATE_HOME");
        std::env::set_var("XDG_CONFIG_HOME", temp.path().join("config"));
        std::env::set_var("XDG_STATE_HOME", temp.path().join("state"));

        let config_path = ConfigManager::default_config_path();
        let audit_path = ConfigManager::audit_log_path();

        for (key, prev) in [("XDG_CONFIG_HOME", prev_config), ("XDG_STATE_HOME", prev_state)] {
            match prev {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }

        assert_eq!(config_path, temp.path().join("config/depcache/config.toml"));
        assert_eq!(audit_path, temp.path().join("state/depcache/audit.log"));
    }

    #[test]
    fn find_local_config_walks_up() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join(LOCAL_CONFIG_NAME), "").unwrap();

        let found = ConfigManager::find_local_config(&nested).unwrap();
        assert_eq!(found, temp.path().join(LOCAL_CONFIG_NAME));
    }
}
