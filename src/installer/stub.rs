//! Deterministic installer for tests
//!
//! Treats the manifest as `{"deps": {"<name>": "<version>"}}` and writes one
//! package directory per dependency. Anything else becomes a single blob.

use crate::cache::manifest::Manifest;
use crate::cache::payload::ArtifactPayload;
use crate::error::{DepcacheError, DepcacheResult};
use crate::installer::Installer;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct StubInstaller {
    calls: AtomicUsize,
    rewrite_manifest: bool,
    fail: bool,
}

impl StubInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a newline to the manifest it reports as consumed
    pub fn rewriting() -> Self {
        Self {
            rewrite_manifest: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Installer for StubInstaller {
    async fn install(
        &self,
        manifest: &Manifest,
        workspace: &Path,
    ) -> DepcacheResult<ArtifactPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DepcacheError::ExternalProcess {
                program: "stub install".to_string(),
                code: 1,
                output: "npm ERR! stub failure".to_string(),
            });
        }

        let root = workspace.join("payload");
        std::fs::create_dir_all(&root).map_err(|e| DepcacheError::io("stub payload", e))?;

        let parsed: Option<serde_json::Value> = serde_json::from_slice(manifest.bytes()).ok();
        let deps = parsed
            .as_ref()
            .and_then(|v| v.get("deps"))
            .and_then(|d| d.as_object());

        let mut lock = String::new();
        match deps {
            Some(deps) => {
                for (name, version) in deps {
                    let version = version.as_str().unwrap_or("*");
                    let dir = root.join(name);
                    std::fs::create_dir_all(&dir).map_err(|e| DepcacheError::io("stub", e))?;
                    std::fs::write(
                        dir.join("package.json"),
                        format!("{{\"name\":\"{name}\",\"version\":\"{version}\"}}"),
                    )
                    .map_err(|e| DepcacheError::io("stub", e))?;
                    std::fs::write(dir.join("index.js"), format!("module.exports = '{version}';"))
                        .map_err(|e| DepcacheError::io("stub", e))?;
                    lock.push_str(&format!("{name}@{version}\n"));
                }
            }
            None => {
                std::fs::write(root.join("blob"), manifest.bytes())
                    .map_err(|e| DepcacheError::io("stub", e))?;
            }
        }

        let consumed = if self.rewrite_manifest {
            let mut bytes = manifest.bytes().to_vec();
            bytes.push(b'\n');
            Manifest::from_bytes(bytes)
        } else {
            manifest.clone()
        };

        let payload = ArtifactPayload::new(root);
        payload
            .write_snapshots(&consumed, Some(lock.as_bytes()))
            .await?;
        Ok(payload)
    }

    fn name(&self) -> String {
        "stub".to_string()
    }
}
