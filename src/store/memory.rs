//! In-memory content-addressed store
//!
//! Trees are kept as path → node maps and hashed with SHA-256 over the
//! sorted listing. A `MemoryStore` can be linked to a shared "remote"
//! `MemoryStore` to model fetch and push.

use crate::cache::payload::{write_nodes, ArtifactPayload, PayloadNode};
use crate::error::{DepcacheError, DepcacheResult};
use crate::store::{EntryId, FileListing, ObjectStore, StoreFactory, TreeHash};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

type Tree = BTreeMap<String, PayloadNode>;

#[derive(Debug, Clone)]
struct Commit {
    tree: Tree,
    tree_hash: TreeHash,
    message: String,
}

#[derive(Debug, Default)]
struct Objects {
    commits: HashMap<EntryId, Commit>,
    tags: HashMap<String, EntryId>,
}

/// Content-addressed store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<Objects>>,
    remote: Option<Box<MemoryStore>>,
    remote_name: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose fetch/push go to `remote`
    pub fn with_remote(remote: &MemoryStore, name: impl Into<String>) -> Self {
        Self {
            objects: Arc::default(),
            remote: Some(Box::new(remote.clone())),
            remote_name: Some(name.into()),
        }
    }

    /// Insert a tree directly, bypassing any producer; returns the commit id
    pub fn insert_tree(&self, tree: BTreeMap<String, PayloadNode>, message: &str) -> EntryId {
        let tree_hash = hash_tree(&tree);
        let id = commit_id(&tree_hash, message);
        self.lock().commits.insert(
            id.clone(),
            Commit {
                tree,
                tree_hash,
                message: message.to_string(),
            },
        );
        id
    }

    /// Tree of a stored commit, for tests that tamper with entries
    pub fn tree(&self, id: &EntryId) -> Option<BTreeMap<String, PayloadNode>> {
        self.lock().commits.get(id).map(|c| c.tree.clone())
    }

    /// Commit message of a stored commit
    pub fn message(&self, id: &EntryId) -> Option<String> {
        self.lock().commits.get(id).map(|c| c.message.clone())
    }

    /// Names of all tags
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.lock().tags.keys().cloned().collect();
        tags.sort();
        tags
    }

    fn lock(&self) -> MutexGuard<'_, Objects> {
        // A poisoned map is still consistent: every write is a single insert
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit(&self, id: &EntryId) -> DepcacheResult<Commit> {
        self.lock()
            .commits
            .get(id)
            .cloned()
            .ok_or_else(|| DepcacheError::EntryNotFound(id.to_string()))
    }

    fn remote_store(&self) -> DepcacheResult<&MemoryStore> {
        self.remote.as_deref().ok_or(DepcacheError::RemoteNotConfigured)
    }
}

/// Hex SHA-256 of a single node, tagged by kind
pub fn hash_node(node: &PayloadNode) -> String {
    let mut hasher = Sha256::new();
    match node {
        PayloadNode::File {
            contents,
            executable,
        } => {
            hasher.update(if *executable { b"x\0" } else { b"f\0" });
            hasher.update(contents);
        }
        PayloadNode::Symlink { target } => {
            hasher.update(b"l\0");
            hasher.update(target.to_string_lossy().as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Structural hash of a tree: SHA-256 over the sorted path/node-hash listing
pub fn hash_tree(tree: &BTreeMap<String, PayloadNode>) -> TreeHash {
    let mut hasher = Sha256::new();
    for (path, node) in tree {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash_node(node).as_bytes());
        hasher.update(b"\n");
    }
    TreeHash::new(hex::encode(hasher.finalize()))
}

fn commit_id(tree_hash: &TreeHash, message: &str) -> EntryId {
    let mut hasher = Sha256::new();
    hasher.update(tree_hash.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(message.as_bytes());
    let hex = hex::encode(hasher.finalize());
    EntryId(hex[..40].to_string())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn resolve_tag(&self, tag: &str) -> DepcacheResult<Option<EntryId>> {
        Ok(self.lock().tags.get(tag).cloned())
    }

    async fn contains(&self, id: &EntryId) -> DepcacheResult<bool> {
        Ok(self.lock().commits.contains_key(id))
    }

    async fn fetch(&self, id: &EntryId) -> DepcacheResult<()> {
        let remote = self.remote_store()?;
        let tag = id.tag();
        let missing = || DepcacheError::RemoteMissing {
            id: id.to_string(),
            remote: self.remote_name.clone().unwrap_or_default(),
        };

        let target = remote.lock().tags.get(&tag).cloned().ok_or_else(missing)?;
        let commit = remote.lock().commits.get(&target).cloned().ok_or_else(missing)?;

        let mut objects = self.lock();
        objects.commits.insert(target.clone(), commit);
        objects.tags.insert(tag, target);
        Ok(())
    }

    async fn tree_hash_of(&self, id: &EntryId) -> DepcacheResult<TreeHash> {
        Ok(self.commit(id)?.tree_hash)
    }

    async fn blob_at(&self, id: &EntryId, path: &str) -> DepcacheResult<Option<Vec<u8>>> {
        let commit = self.commit(id)?;
        Ok(match commit.tree.get(path) {
            Some(PayloadNode::File { contents, .. }) => Some(contents.clone()),
            _ => None,
        })
    }

    async fn list_files(&self, id: &EntryId) -> DepcacheResult<FileListing> {
        let commit = self.commit(id)?;
        Ok(commit
            .tree
            .iter()
            .map(|(path, node)| (path.clone(), hash_node(node)))
            .collect())
    }

    async fn commit_tree(
        &self,
        payload: &ArtifactPayload,
        message: &str,
    ) -> DepcacheResult<EntryId> {
        let tree = payload.nodes().await?;
        Ok(self.insert_tree(tree, message))
    }

    async fn tag(&self, id: &EntryId, name: &str) -> DepcacheResult<()> {
        let mut objects = self.lock();
        if !objects.commits.contains_key(id) {
            return Err(DepcacheError::EntryNotFound(id.to_string()));
        }
        objects.tags.insert(name.to_string(), id.clone());
        Ok(())
    }

    async fn push(&self, tag: &str) -> DepcacheResult<()> {
        let remote = self.remote_store()?;
        let (id, commit) = {
            let objects = self.lock();
            let id = objects
                .tags
                .get(tag)
                .cloned()
                .ok_or_else(|| DepcacheError::Internal(format!("unknown tag {tag}")))?;
            let commit = objects
                .commits
                .get(&id)
                .cloned()
                .ok_or_else(|| DepcacheError::EntryNotFound(id.to_string()))?;
            (id, commit)
        };

        let mut theirs = remote.lock();
        theirs.commits.insert(id.clone(), commit);
        theirs.tags.insert(tag.to_string(), id);
        Ok(())
    }

    async fn materialize(&self, id: &EntryId, dest: &Path) -> DepcacheResult<()> {
        let commit = self.commit(id)?;
        write_nodes(dest, &commit.tree).await
    }

    fn remote(&self) -> Option<&str> {
        self.remote_name.as_deref()
    }
}

/// Hands out fresh, unconnected memory stores
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreFactory;

#[async_trait]
impl StoreFactory for MemoryStoreFactory {
    async fn scratch(&self) -> DepcacheResult<Box<dyn ObjectStore>> {
        Ok(Box::new(MemoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(contents: &str) -> PayloadNode {
        PayloadNode::File {
            contents: contents.as_bytes().to_vec(),
            executable: false,
        }
    }

    fn tree(files: &[(&str, &str)]) -> Tree {
        files
            .iter()
            .map(|(p, c)| (p.to_string(), file(c)))
            .collect()
    }

    #[test]
    fn tree_hash_depends_on_layout_and_content() {
        let a = hash_tree(&tree(&[("a/index.js", "1")]));
        assert_eq!(a, hash_tree(&tree(&[("a/index.js", "1")])));
        assert_ne!(a, hash_tree(&tree(&[("a/index.js", "2")])));
        assert_ne!(a, hash_tree(&tree(&[("b/index.js", "1")])));
    }

    #[tokio::test]
    async fn push_then_fetch_through_remote() {
        let remote = MemoryStore::new();
        let producer = MemoryStore::with_remote(&remote, "cache");
        let consumer = MemoryStore::with_remote(&remote, "cache");

        let id = producer.insert_tree(tree(&[("x", "1")]), "depcache: test");
        producer.tag(&id, &id.tag()).await.unwrap();
        producer.push(&id.tag()).await.unwrap();

        assert!(!consumer.contains(&id).await.unwrap());
        consumer.fetch(&id).await.unwrap();
        assert!(consumer.contains(&id).await.unwrap());
        assert_eq!(
            consumer.tree_hash_of(&id).await.unwrap(),
            producer.tree_hash_of(&id).await.unwrap()
        );
        assert_eq!(consumer.resolve_tag(&id.tag()).await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn fetch_unknown_is_remote_missing() {
        let remote = MemoryStore::new();
        let store = MemoryStore::with_remote(&remote, "cache");
        let id = EntryId::parse("0123456789abcdef").unwrap();

        let err = store.fetch(&id).await.unwrap_err();
        assert!(matches!(err, DepcacheError::RemoteMissing { .. }));
    }

    #[tokio::test]
    async fn fetch_without_remote_is_not_configured() {
        let store = MemoryStore::new();
        let id = EntryId::parse("0123456789abcdef").unwrap();
        let err = store.fetch(&id).await.unwrap_err();
        assert!(matches!(err, DepcacheError::RemoteNotConfigured));
    }

    #[tokio::test]
    async fn blob_at_reads_files_only() {
        let store = MemoryStore::new();
        let id = store.insert_tree(tree(&[(".depcache/manifest", "{}")]), "m");

        assert_eq!(
            store.blob_at(&id, ".depcache/manifest").await.unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(store.blob_at(&id, "missing").await.unwrap(), None);
    }
}
