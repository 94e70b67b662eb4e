//! Git-backed object store
//!
//! Entries live in a bare repository. Trees are written through a private
//! temporary index so the repository never needs a work tree of its own,
//! and the structural hash of an entry is git's own tree id.

use crate::cache::payload::ArtifactPayload;
use crate::error::{DepcacheError, DepcacheResult};
use crate::exec::Exec;
use crate::store::{EntryId, FileListing, ObjectStore, StoreFactory, TreeHash};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, info};

const COMMIT_IDENTITY: &str = "depcache";
const COMMIT_EMAIL: &str = "depcache@localhost";

/// Object store backed by a bare git repository
#[derive(Debug)]
pub struct GitStore {
    git_dir: PathBuf,
    remote: Option<String>,
    // Keeps scratch repositories alive for as long as the store is
    _scratch: Option<TempDir>,
}

impl GitStore {
    /// Open the bare repository at `git_dir`, initializing it if needed
    pub async fn open(git_dir: impl Into<PathBuf>, remote: Option<String>) -> DepcacheResult<Self> {
        let git_dir = git_dir.into();
        init_bare(&git_dir).await?;
        Ok(Self {
            git_dir,
            remote,
            _scratch: None,
        })
    }

    /// Throwaway repository removed when the store is dropped
    pub async fn scratch() -> DepcacheResult<Self> {
        let dir = TempDir::new().map_err(|e| DepcacheError::io("creating scratch store", e))?;
        let git_dir = dir.path().join("store.git");
        init_bare(&git_dir).await?;
        Ok(Self {
            git_dir,
            remote: None,
            _scratch: Some(dir),
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn git(&self) -> Exec {
        Exec::new("git").arg("--git-dir").arg(&self.git_dir)
    }

    /// git invocation using a private index file
    fn git_with_index(&self, index: &Path) -> Exec {
        self.git().env("GIT_INDEX_FILE", index)
    }

    fn remote_url(&self) -> DepcacheResult<&str> {
        self.remote.as_deref().ok_or(DepcacheError::RemoteNotConfigured)
    }

    async fn require(&self, id: &EntryId) -> DepcacheResult<()> {
        if self.contains(id).await? {
            Ok(())
        } else {
            Err(DepcacheError::EntryNotFound(id.to_string()))
        }
    }
}

async fn init_bare(git_dir: &Path) -> DepcacheResult<()> {
    if git_dir.join("HEAD").is_file() {
        return Ok(());
    }
    fs::create_dir_all(git_dir)
        .await
        .map_err(|e| DepcacheError::io(format!("creating store {}", git_dir.display()), e))?;
    Exec::new("git")
        .args(["init", "--bare", "--quiet"])
        .arg(git_dir)
        .checked()
        .await?;
    info!("Initialized cache store at {}", git_dir.display());
    Ok(())
}

fn temp_index() -> DepcacheResult<(TempDir, PathBuf)> {
    let dir = TempDir::new().map_err(|e| DepcacheError::io("creating temporary index", e))?;
    let index = dir.path().join("index");
    Ok((dir, index))
}

/// Parse `git ls-tree -r -z` output into path → "mode hash"
fn parse_ls_tree(output: &[u8]) -> FileListing {
    output
        .split(|b| *b == 0)
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let record = String::from_utf8_lossy(record);
            let (meta, path) = record.split_once('\t')?;
            let mut fields = meta.split_whitespace();
            let mode = fields.next()?;
            let _kind = fields.next()?;
            let hash = fields.next()?;
            Some((path.to_string(), format!("{mode} {hash}")))
        })
        .collect()
}

#[async_trait]
impl ObjectStore for GitStore {
    async fn resolve_tag(&self, tag: &str) -> DepcacheResult<Option<EntryId>> {
        let output = self
            .git()
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("refs/tags/{tag}^{{commit}}"))
            .output()
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        EntryId::parse(&String::from_utf8_lossy(&output.stdout)).map(Some)
    }

    async fn contains(&self, id: &EntryId) -> DepcacheResult<bool> {
        let output = self
            .git()
            .args(["cat-file", "-e"])
            .arg(format!("{id}^{{commit}}"))
            .output()
            .await?;
        Ok(output.status.success())
    }

    async fn fetch(&self, id: &EntryId) -> DepcacheResult<()> {
        let remote = self.remote_url()?;
        let tag = id.tag();
        debug!("Fetching {} from {}", tag, remote);

        let exec = self
            .git()
            .args(["fetch", "--no-tags", "--quiet", remote])
            .arg(format!("+refs/tags/{tag}:refs/tags/{tag}"));
        let output = exec.output().await?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("couldn't find remote ref") || stderr.contains("not our ref") {
            Err(DepcacheError::RemoteMissing {
                id: id.to_string(),
                remote: remote.to_string(),
            })
        } else {
            Err(exec.failure(&output))
        }
    }

    async fn tree_hash_of(&self, id: &EntryId) -> DepcacheResult<TreeHash> {
        self.require(id).await?;
        let tree = self
            .git()
            .args(["rev-parse", "--verify"])
            .arg(format!("{id}^{{tree}}"))
            .stdout_string()
            .await?;
        Ok(TreeHash::new(tree))
    }

    async fn blob_at(&self, id: &EntryId, path: &str) -> DepcacheResult<Option<Vec<u8>>> {
        self.require(id).await?;
        let object = format!("{id}:{path}");

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

    async fn list_files(&self, id: &EntryId) -> DepcacheResult<FileListing> {
        self.require(id).await?;
        let output = self
            .git()
            .args(["ls-tree", "-r", "-z", id.as_str()])
            .checked()
            .await?;
        Ok(parse_ls_tree(&output))
    }

    async fn commit_tree(
        &self,
        payload: &ArtifactPayload,
        message: &str,
    ) -> DepcacheResult<EntryId> {
        let (_index_dir, index) = temp_index()?;
        let root = payload.root();

        self.git_with_index(&index)
            .arg("--work-tree")
            .arg(root)
            .args(["add", "--all", "--force", "."])
            .current_dir(root)
            .checked()
            .await?;

        let tree = self
            .git_with_index(&index)
            .arg("write-tree")
            .stdout_string()
            .await?;

        let commit = self
            .git()
            .env("GIT_AUTHOR_NAME", COMMIT_IDENTITY)
            .env("GIT_AUTHOR_EMAIL", COMMIT_EMAIL)
            .env("GIT_COMMITTER_NAME", COMMIT_IDENTITY)
            .env("GIT_COMMITTER_EMAIL", COMMIT_EMAIL)
            .args(["commit-tree", &tree, "-m", message])
            .stdout_string()
            .await?;

        debug!("Committed tree {} as {}", tree, commit);
        EntryId::parse(&commit)
    }

    async fn tag(&self, id: &EntryId, name: &str) -> DepcacheResult<()> {
        self.git()
            .args(["update-ref", &format!("refs/tags/{name}"), id.as_str()])
            .checked()
            .await?;
        Ok(())
    }

    async fn push(&self, tag: &str) -> DepcacheResult<()> {
        let remote = self.remote_url()?;
        info!("Pushing {} to {}", tag, remote);
        self.git()
            .args(["push", "--quiet", remote])
            .arg(format!("refs/tags/{tag}:refs/tags/{tag}"))
            .checked()
            .await?;
        Ok(())
    }

    async fn materialize(&self, id: &EntryId, dest: &Path) -> DepcacheResult<()> {
        self.require(id).await?;
        fs::create_dir_all(dest)
            .await
            .map_err(|e| DepcacheError::io(format!("creating {}", dest.display()), e))?;

        let (_index_dir, index) = temp_index()?;
        self.git_with_index(&index)
            .args(["read-tree", id.as_str()])
            .checked()
            .await?;
        self.git_with_index(&index)
            .arg("--work-tree")
            .arg(dest)
            .args(["checkout-index", "--all", "--force"])
            .current_dir(dest)
            .checked()
            .await?;
        Ok(())
    }

    fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }
}

/// Creates scratch git repositories in temporary directories
#[derive(Debug, Clone, Default)]
pub struct GitStoreFactory;

#[async_trait]
impl StoreFactory for GitStoreFactory {
    async fn scratch(&self) -> DepcacheResult<Box<dyn ObjectStore>> {
        Ok(Box::new(GitStore::scratch().await?))
    }
}
