//! Configuration schema for depcache
//!
//! Global configuration lives at `~/.config/depcache/config.toml`; a
//! project-local `.depcache.toml` overrides individual keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Project file layout
    pub project: ProjectConfig,

    /// Object store settings
    pub store: StoreConfig,

    /// Hermetic installer settings
    pub installer: InstallerConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Echo every external command (also `DEPCACHE_TRACE`)
    pub trace: bool,

    /// Enable audit logging
    pub audit_log: bool,

    /// Audit log location (defaults to the state directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_path: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            trace: false,
            audit_log: true,
            audit_path: None,
        }
    }
}

/// Names of the files the cache protocol works on, relative to the project root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Dependency manifest
    pub manifest: String,

    /// Derived lock artifact refreshed by `make_package_lock`
    pub lockfile: String,

    /// Working checkout directory (tracked as a gitlink)
    pub checkout_dir: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            manifest: "package.json".to_string(),
            lockfile: "package-lock.json".to_string(),
            checkout_dir: "node_modules".to_string(),
        }
    }
}

/// Object store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Local bare repository (defaults to `<git dir>/depcache`)
    pub path: Option<PathBuf>,

    /// Remote cache repository URL used for fetch and push
    pub remote: Option<String>,
}

/// Hermetic installer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Container runtime executable ("podman" or "docker")
    pub runtime: String,

    /// Image the install command runs in
    pub image: String,

    /// Shell command run inside the container's working directory
    pub command: String,

    /// Directory the command produces, relative to the working directory
    pub output_dir: String,

    /// Network mode for the install container
    pub network: String,

    /// Environment variables to set
    pub env: HashMap<String, String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            runtime: "podman".to_string(),
            image: "docker.io/library/node:20-bookworm-slim".to_string(),
            command: "npm install --no-audit --no-fund".to_string(),
            output_dir: "node_modules".to_string(),
            network: "bridge".to_string(),
            env: HashMap::new(),
        }
    }
}
