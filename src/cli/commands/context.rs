//! Wiring shared by the commands that work inside a project

use crate::audit::AuditLog;
use crate::cache::{Fingerprinter, Lifecycle, VerificationJob, STAGED_RECORD};
use crate::config::Config;
use crate::error::DepcacheResult;
use crate::installer::{create_installer, OutputSink};
use crate::project::{GitProject, ProjectRepo};
use crate::store::{GitStore, GitStoreFactory};
use crate::ui::{InstallProgress, UiContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Directory under the project's git dir holding the local store
const DEFAULT_STORE_DIR: &str = "depcache";

/// Project, store and installer for one invocation
pub struct CommandContext {
    pub config: Config,
    pub ui: UiContext,
    project: Arc<GitProject>,
    store: Arc<GitStore>,
    progress: Arc<InstallProgress>,
}

impl CommandContext {
    /// Discover the project containing `project_dir` and open its store
    pub async fn open(config: Config, project_dir: &Path, ui: UiContext) -> DepcacheResult<Self> {
        let project = GitProject::discover(project_dir).await?;
        let store_path = store_path(&config, &project);
        debug!("Opening store {}", store_path.display());
        let store = GitStore::open(store_path, config.store.remote.clone()).await?;

        let progress = Arc::new(InstallProgress::new(&ui, &config.installer.command));

        Ok(Self {
            config,
            ui,
            project: Arc::new(project),
            store: Arc::new(store),
            progress,
        })
    }

    pub fn project_root(&self) -> &Path {
        self.project.root()
    }

    pub fn progress(&self) -> &InstallProgress {
        &self.progress
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(
            self.project.clone(),
            self.store.clone(),
            self.fingerprinter(),
            &self.config.project,
            self.store.git_dir().join(STAGED_RECORD),
        )
        .with_audit(AuditLog::new(&self.config))
    }

    pub fn verification_job(&self) -> VerificationJob {
        VerificationJob::new(
            self.project.clone(),
            self.store.clone(),
            self.fingerprinter(),
            &self.config.project,
        )
    }

    fn fingerprinter(&self) -> Fingerprinter {
        let progress = self.progress.clone();
        let sink: OutputSink = Arc::new(move |line: String| progress.on_line(line));
        Fingerprinter::new(
            create_installer(&self.config, Some(sink)),
            Arc::new(GitStoreFactory),
        )
    }
}

/// `store.path` (relative to the project root), or `<git dir>/depcache`
fn store_path(config: &Config, project: &GitProject) -> PathBuf {
    match config.store.path {
        Some(ref path) if path.is_absolute() => path.clone(),
        Some(ref path) => project.root().join(path),
        None => project.git_dir().join(DEFAULT_STORE_DIR),
    }
}
