//! Shared fixtures for cache protocol tests

use crate::cache::entry::CacheEntry;
use crate::cache::manifest::Manifest;
use crate::error::DepcacheResult;
use crate::installer::stub::StubInstaller;
use crate::installer::Installer;
use crate::project::ProjectRepo;
use crate::store::{EntryId, MemoryStore, ObjectStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Install `manifest` with the stub installer and commit it into `store`
pub async fn install_entry(store: &MemoryStore, manifest: &Manifest) -> CacheEntry {
    let workspace = TempDir::new().unwrap();
    let payload = StubInstaller::new()
        .install(manifest, workspace.path())
        .await
        .unwrap();
    let id = store
        .commit_tree(&payload, &format!("depcache: {}", manifest.key()))
        .await
        .unwrap();
    store.tag(&id, &id.tag()).await.unwrap();
    CacheEntry::load(store, &id).await.unwrap()
}

/// One commit of a fake project history
#[derive(Debug, Clone)]
pub struct FakeCommit {
    pub id: String,
    pub files: HashMap<String, Vec<u8>>,
    pub pointer: Option<EntryId>,
}

/// In-memory project repository rooted at a real temporary directory
pub struct FakeProject {
    root: TempDir,
    pub index_pointer: Mutex<Option<EntryId>>,
    pub commits: Vec<FakeCommit>,
    /// Revisions whose files were read, in order
    pub reads: Mutex<Vec<String>>,
}

impl FakeProject {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            index_pointer: Mutex::new(None),
            commits: Vec::new(),
            reads: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        std::fs::write(self.path(rel), contents).unwrap();
    }

    /// Append a commit with `manifest` at `package.json` and the given pointer
    pub fn commit(&mut self, id: &str, manifest: &Manifest, pointer: Option<&EntryId>) {
        let mut files = HashMap::new();
        files.insert("package.json".to_string(), manifest.bytes().to_vec());
        self.commits.push(FakeCommit {
            id: id.to_string(),
            files,
            pointer: pointer.cloned(),
        });
    }

    pub fn set_pointer(&self, id: &EntryId) {
        *self.index_pointer.lock().unwrap() = Some(id.clone());
    }

    fn find(&self, revision: &str) -> Option<&FakeCommit> {
        self.commits.iter().find(|c| c.id == revision)
    }
}

#[async_trait]
impl ProjectRepo for FakeProject {
    fn root(&self) -> &Path {
        self.root.path()
    }

    async fn pointer(&self, _checkout_dir: &str) -> DepcacheResult<Option<EntryId>> {
        Ok(self.index_pointer.lock().unwrap().clone())
    }

    async fn stage_pointer(&self, _checkout_dir: &str, id: &EntryId) -> DepcacheResult<()> {
        self.set_pointer(id);
        Ok(())
    }

    async fn history(
        &self,
        base: &str,
        head: &str,
        paths: &[&str],
    ) -> DepcacheResult<Vec<String>> {
        let start = self.commits.iter().position(|c| c.id == base).map_or(0, |i| i + 1);
        let end = self
            .commits
            .iter()
            .position(|c| c.id == head)
            .map_or(self.commits.len(), |i| i + 1);

        let mut touched = Vec::new();
        for i in start..end {
            let commit = &self.commits[i];
            let previous = i.checked_sub(1).map(|p| &self.commits[p]);
            let changed = match previous {
                None => true,
                Some(prev) => {
                    prev.pointer != commit.pointer
                        || paths
                            .iter()
                            .any(|p| prev.files.get(*p) != commit.files.get(*p))
                }
            };
            if changed {
                touched.push(commit.id.clone());
            }
        }
        Ok(touched)
    }

    async fn file_at(&self, revision: &str, path: &str) -> DepcacheResult<Option<Vec<u8>>> {
        self.reads.lock().unwrap().push(revision.to_string());
        Ok(self.find(revision).and_then(|c| c.files.get(path).cloned()))
    }

    async fn pointer_at(
        &self,
        revision: &str,
        _checkout_dir: &str,
    ) -> DepcacheResult<Option<EntryId>> {
        Ok(self.find(revision).and_then(|c| c.pointer.clone()))
    }

    fn lingering_paths(&self, checkout_dir: &str) -> Vec<PathBuf> {
        vec![self.path(".git").join("modules").join(checkout_dir)]
    }
}
