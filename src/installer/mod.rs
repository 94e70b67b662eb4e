//! Hermetic dependency installation
//!
//! An [`Installer`] turns a manifest into an artifact payload using nothing
//! but that manifest: no pre-existing `node_modules`, no package cache from a
//! previous run, no project files. The production implementation runs the
//! install command in a fresh rootless container.

mod container;
#[cfg(test)]
pub(crate) mod stub;

pub use container::{ContainerInstaller, CtrlC, Interrupt};

use crate::cache::manifest::Manifest;
use crate::cache::payload::ArtifactPayload;
use crate::config::Config;
use crate::error::DepcacheResult;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Callback receiving installer output line by line
pub type OutputSink = Arc<dyn Fn(String) + Send + Sync>;

/// Abstract hermetic installer
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install `manifest` inside the empty directory `workspace`.
    ///
    /// The returned payload lives under `workspace` and carries the manifest
    /// as actually consumed. Any installer failure is an error; no partial
    /// payload is ever returned.
    async fn install(&self, manifest: &Manifest, workspace: &Path)
        -> DepcacheResult<ArtifactPayload>;

    /// Human-readable installer name for display
    fn name(&self) -> String;
}

/// Create the configured installer
pub fn create_installer(config: &Config, output: Option<OutputSink>) -> Arc<dyn Installer> {
    let installer = ContainerInstaller::new(config.installer.clone(), config.project.clone());
    match output {
        Some(sink) => Arc::new(installer.with_output(sink)),
        None => Arc::new(installer),
    }
}
