//! Project repository backed by the `git` CLI

use crate::error::{DepcacheError, DepcacheResult};
use crate::exec::Exec;
use crate::project::{parse_gitlink, ProjectRepo, GITLINK_MODE};
use crate::store::EntryId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A project checked out in a git work tree
#[derive(Debug, Clone)]
pub struct GitProject {
    root: PathBuf,
    git_dir: PathBuf,
}

impl GitProject {
    /// Locate the work tree containing `start`
    pub async fn discover(start: &Path) -> DepcacheResult<Self> {
        let output = Exec::new("git")
            .arg("-C")
            .arg(start)
            .args([
                "rev-parse",
                "--path-format=absolute",
                "--show-toplevel",
                "--git-common-dir",
            ])
            .output()
            .await?;

        if !output.status.success() {
            return Err(DepcacheError::NotAGitRepository(start.to_path_buf()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();
        match (lines.next(), lines.next()) {
            (Some(root), Some(git_dir)) => {
                debug!("Project root {}, git dir {}", root, git_dir);
                Ok(Self {
                    root: PathBuf::from(root),
                    git_dir: PathBuf::from(git_dir),
                })
            }
            _ => Err(DepcacheError::NotAGitRepository(start.to_path_buf())),
        }
    }

    /// Shared git directory (the default home of the local cache store)
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn git(&self) -> Exec {
        Exec::new("git").arg("-C").arg(&self.root)
    }
}

#[async_trait]
impl ProjectRepo for GitProject {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn pointer(&self, checkout_dir: &str) -> DepcacheResult<Option<EntryId>> {
        let out = self
            .git()
            .args(["ls-files", "--stage", "--", checkout_dir])
            .stdout_string()
            .await?;
        Ok(out.lines().find_map(parse_gitlink))
    }

    async fn stage_pointer(&self, checkout_dir: &str, id: &EntryId) -> DepcacheResult<()> {
        self.git()
            .args(["update-index", "--add", "--cacheinfo"])
            .arg(format!("{GITLINK_MODE},{id},{checkout_dir}"))
            .checked()
            .await?;
        Ok(())
    }

    async fn history(
        &self,
        base: &str,
        head: &str,
        paths: &[&str],
    ) -> DepcacheResult<Vec<String>> {
        let out = self
            .git()
            .args(["rev-list", "--reverse"])
            .arg(format!("{base}..{head}"))
            .arg("--")
            .args(paths.iter().copied())
            .stdout_string()
            .await?;
        Ok(out.lines().map(str::to_string).collect())
    }

    async fn file_at(&self, revision: &str, path: &str) -> DepcacheResult<Option<Vec<u8>>> {
        let object = format!("{revision}:{path}");
        let exists = self
            .git()
            .args(["cat-file", "-e", &object])
            .output()
            .await?
            .status
            .success();
        if !exists {
            return Ok(None);
        }
        self.git()
            .args(["cat-file", "blob", &object])
            .checked()
            .await
            .map(Some)
    }

    async fn pointer_at(
        &self,
        revision: &str,
        checkout_dir: &str,
    ) -> DepcacheResult<Option<EntryId>> {
        let out = self
            .git()
            .args(["ls-tree", revision, "--", checkout_dir])
            .stdout_string()
            .await?;
        Ok(out.lines().find_map(parse_gitlink))
    }

    fn lingering_paths(&self, checkout_dir: &str) -> Vec<PathBuf> {
        vec![self.git_dir.join("modules").join(checkout_dir)]
    }
}
