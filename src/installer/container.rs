//! Container-based hermetic installer
//!
//! Runs the install command in a throwaway rootless container. Only a fresh
//! workspace holding the manifest is mounted, so nothing from the project
//! or a previous run can leak into the result.

use crate::cache::manifest::Manifest;
use crate::cache::payload::ArtifactPayload;
use crate::config::schema::{InstallerConfig, ProjectConfig};
use crate::error::{DepcacheError, DepcacheResult};
use crate::exec::{stream_child_output, tail_lines, Exec};
use crate::installer::{Installer, OutputSink};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mount point of the workspace inside the container
const CONTAINER_WORKDIR: &str = "/work";

/// Signal that abandons a running install
#[async_trait]
pub trait Interrupt: Send + Sync {
    /// Resolves once the install must stop; pending forever otherwise
    async fn triggered(&self);
}

/// Ctrl-C delivered to the process
pub struct CtrlC;

#[async_trait]
impl Interrupt for CtrlC {
    async fn triggered(&self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Installer running the configured command in a podman or docker container
pub struct ContainerInstaller {
    config: InstallerConfig,
    project: ProjectConfig,
    on_output: OutputSink,
    interrupt: Arc<dyn Interrupt>,
}

impl ContainerInstaller {
    pub fn new(config: InstallerConfig, project: ProjectConfig) -> Self {
        Self {
            config,
            project,
            on_output: Arc::new(|line: String| debug!("install: {}", line)),
            interrupt: Arc::new(CtrlC),
        }
    }

    /// Abandon installs when `interrupt` fires instead of on Ctrl-C
    pub fn with_interrupt(mut self, interrupt: Arc<dyn Interrupt>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Send installer output lines to `sink` instead of the debug log
    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.on_output = sink;
        self
    }

    fn is_docker(&self) -> bool {
        Path::new(&self.config.runtime)
            .file_name()
            .is_some_and(|name| name == "docker")
    }

    /// Check the runtime executable responds
    async fn ensure_runtime(&self) -> DepcacheResult<()> {
        let available = Exec::new(&self.config.runtime)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);

        if available {
            Ok(())
        } else {
            Err(DepcacheError::RuntimeNotFound(self.config.runtime.clone()))
        }
    }

    /// Build the `run` invocation for one install
    fn run_command(&self, container_name: &str, source_dir: &Path) -> Exec {
        let volume_suffix = if self.is_docker() { "" } else { ":Z" };
        let mut exec = Exec::new(&self.config.runtime)
            .args(["run", "--rm", "--name", container_name])
            .args(["--network", self.config.network.as_str()])
            .arg("-v")
            .arg(format!(
                "{}:{}{}",
                source_dir.display(),
                CONTAINER_WORKDIR,
                volume_suffix
            ))
            .args(["-w", CONTAINER_WORKDIR])
            .args(["-e", "HOME=/tmp"]);

        // Docker runs as root by default; keep output owned by the caller
        if self.is_docker() {
            exec = exec.args(["--user", &current_user()]);
        }

        let mut env: Vec<_> = self.config.env.iter().collect();
        env.sort();
        for (k, v) in env {
            exec = exec.arg("-e").arg(format!("{k}={v}"));
        }

        exec.arg(&self.config.image)
            .args(["sh", "-c", self.config.command.as_str()])
    }

    /// Remove the container after an interruption
    async fn force_remove(&self, container_name: &str) {
        let result = Exec::new(&self.config.runtime)
            .args(["rm", "-f", container_name])
            .output()
            .await;
        if let Err(e) = result {
            warn!("Failed to remove install container {}: {}", container_name, e);
        }
    }

    /// Assemble the payload from the container's output in `source_dir`
    async fn collect_payload(
        &self,
        source_dir: &Path,
        workspace: &Path,
    ) -> DepcacheResult<ArtifactPayload> {
        let payload_dir = workspace.join("payload");
        let output_dir = source_dir.join(&self.config.output_dir);

        if output_dir.is_dir() {
            fs::rename(&output_dir, &payload_dir).await.map_err(|e| {
                DepcacheError::io(format!("moving {}", output_dir.display()), e)
            })?;
        } else {
            // Manifests without dependencies produce no output directory
            fs::create_dir_all(&payload_dir)
                .await
                .map_err(|e| DepcacheError::io("creating payload directory", e))?;
        }

        let manifest_path = source_dir.join(&self.project.manifest);
        let consumed = match fs::read(&manifest_path).await {
            Ok(bytes) => Manifest::from_bytes(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DepcacheError::ManifestMissing(manifest_path));
            }
            Err(e) => return Err(DepcacheError::io("reading consumed manifest", e)),
        };

        let lock = match fs::read(source_dir.join(&self.project.lockfile)).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(DepcacheError::io("reading lock artifact", e)),
        };

        let payload = ArtifactPayload::new(payload_dir);
        payload.write_snapshots(&consumed, lock.as_deref()).await?;
        Ok(payload)
    }
}

#[cfg(unix)]
fn current_user() -> String {
    // SAFETY: getuid/getgid have no preconditions and cannot fail
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    format!("{uid}:{gid}")
}

#[cfg(not(unix))]
fn current_user() -> String {
    "0:0".to_string()
}

#[async_trait]
impl Installer for ContainerInstaller {
    async fn install(
        &self,
        manifest: &Manifest,
        workspace: &Path,
    ) -> DepcacheResult<ArtifactPayload> {
        self.ensure_runtime().await?;

        let source_dir = workspace.join("src");
        fs::create_dir_all(&source_dir)
            .await
            .map_err(|e| DepcacheError::io("creating install workspace", e))?;
        fs::write(source_dir.join(&self.project.manifest), manifest.bytes())
            .await
            .map_err(|e| DepcacheError::io("writing manifest into workspace", e))?;

        let container_name = format!("depcache-install-{}", Uuid::new_v4().simple());
        let exec = self.run_command(&container_name, &source_dir);
        info!(
            "Installing {} in {} ({})",
            manifest.short_key(),
            self.config.image,
            container_name
        );

        let mut child = exec
            .command()
            .spawn()
            .map_err(|e| DepcacheError::command_failed(exec.display(), e))?;

        let on_output = self.on_output.clone();
        let outcome = {
            let run = async {
                let lines = stream_child_output(&mut child, &*on_output).await;
                let status = child.wait().await;
                (lines, status)
            };
            tokio::select! {
                biased;
                _ = self.interrupt.triggered() => None,
                done = run => Some(done),
            }
        };

        let Some((lines, status)) = outcome else {
            // Child is killed on drop; the container needs an explicit rm
            drop(child);
            self.force_remove(&container_name).await;
            return Err(DepcacheError::Interrupted(exec.display()));
        };

        let status = status.map_err(|e| DepcacheError::command_failed(exec.display(), e))?;
        if !status.success() {
            return Err(DepcacheError::ExternalProcess {
                program: exec.display(),
                code: status.code().unwrap_or(-1),
                output: tail_lines(&lines),
            });
        }

        self.collect_payload(&source_dir, workspace).await
    }

    fn name(&self) -> String {
        format!("{} ({})", self.config.runtime, self.config.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct AlreadyTriggered;

    #[async_trait]
    impl Interrupt for AlreadyTriggered {
        async fn triggered(&self) {}
    }

    /// Runtime stand-in whose `run` hangs and whose `rm` calls are recorded
    #[cfg(unix)]
    fn hanging_runtime(dir: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;
        let script = dir.join("fake-runtime");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             case \"$1\" in\n\
               run) exec sleep 30 ;;\n\
               rm) echo \"$@\" >> \"$(dirname \"$0\")/removed\" ;;\n\
             esac\n\
             exit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.display().to_string()
    }

    fn installer(runtime: &str) -> ContainerInstaller {
        let config = InstallerConfig {
            runtime: runtime.to_string(),
            ..InstallerConfig::default()
        };
        ContainerInstaller::new(config, ProjectConfig::default())
    }

    #[test]
    fn podman_command_is_hermetic() {
        let line = installer("podman")
            .run_command("depcache-install-x", Path::new("/tmp/ws/src"))
            .display();

        assert!(line.starts_with("podman run --rm --name depcache-install-x"));
        assert!(line.contains("-v /tmp/ws/src:/work:Z"));
        assert!(line.contains("--network bridge"));
        assert!(!line.contains("--user"));
        assert!(line.ends_with("sh -c npm install --no-audit --no-fund"));
    }

    #[test]
    fn docker_command_maps_user() {
        let line = installer("docker")
            .run_command("n", Path::new("/tmp/ws/src"))
            .display();
        assert!(line.contains("-v /tmp/ws/src:/work "));
        assert!(line.contains("--user "));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn interrupt_removes_container() {
        let bin = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let installer =
            installer(&hanging_runtime(bin.path())).with_interrupt(Arc::new(AlreadyTriggered));

        let err = installer
            .install(&Manifest::from_bytes("{}"), workspace.path())
            .await
            .unwrap_err();

        assert!(matches!(err, DepcacheError::Interrupted(_)));
        let removed = std::fs::read_to_string(bin.path().join("removed")).unwrap();
        assert!(removed.starts_with("rm -f depcache-install-"));
        assert!(!workspace.path().join("payload").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn interrupted_install_commits_nothing() {
        use crate::cache::fingerprint::Fingerprinter;
        use crate::cache::staged::STAGED_RECORD;
        use crate::cache::testing::FakeProject;
        use crate::cache::{CheckoutState, Lifecycle};
        use crate::store::{MemoryStore, MemoryStoreFactory};

        let bin = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let installer =
            installer(&hanging_runtime(bin.path())).with_interrupt(Arc::new(AlreadyTriggered));
        let project = Arc::new(FakeProject::new());
        project.write("package.json", r#"{"deps":{"a":"1.0"}}"#);
        let store = MemoryStore::new();
        let staged = state.path().join(STAGED_RECORD);
        let lifecycle = Lifecycle::new(
            project.clone(),
            Arc::new(store.clone()),
            Fingerprinter::new(Arc::new(installer), Arc::new(MemoryStoreFactory)),
            &ProjectConfig::default(),
            staged.clone(),
        );

        let err = lifecycle.install(CheckoutState::Absent).await.unwrap_err();

        assert!(matches!(err, DepcacheError::Interrupted(_)));
        assert!(store.tags().is_empty());
        assert!(!staged.exists());
        assert!(project.index_pointer.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_runtime_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = installer("depcache-no-such-runtime")
            .install(&Manifest::from_bytes("{}"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DepcacheError::RuntimeNotFound(_)));
    }

    #[tokio::test]
    async fn collect_payload_without_output_dir() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("package.json"), "{}").unwrap();

        let payload = installer("podman")
            .collect_payload(&src, dir.path())
            .await
            .unwrap();

        assert_eq!(
            payload.manifest_snapshot().await.unwrap(),
            Some(Manifest::from_bytes("{}"))
        );
        assert!(payload.lock().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn collect_payload_moves_output_and_lock() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("node_modules/a")).unwrap();
        std::fs::write(src.join("node_modules/a/index.js"), "1").unwrap();
        std::fs::write(src.join("package.json"), "{}").unwrap();
        std::fs::write(src.join("package-lock.json"), "lock").unwrap();

        let payload = installer("podman")
            .collect_payload(&src, dir.path())
            .await
            .unwrap();

        assert!(payload.root().join("a/index.js").is_file());
        assert_eq!(payload.lock().await.unwrap(), Some(b"lock".to_vec()));
    }
}
