//! Content-addressed object store
//!
//! Cache entries are commit objects in a store that can resolve tags, fetch
//! and push by tag, report the structural hash of a commit's tree and read
//! individual files. Two backends implement [`ObjectStore`]:
//!
//! - [`GitStore`]: a bare git repository driven through the `git` CLI
//! - [`MemoryStore`]: an in-memory map, used as a scratch store and in tests
//!
//! Every entry `id` is published under the tag `sha-<id>`; fetching an id
//! means fetching that tag from the remote cache repository.

mod git;
mod memory;

pub use git::{GitStore, GitStoreFactory};
pub use memory::{MemoryStore, MemoryStoreFactory};

use crate::cache::payload::ArtifactPayload;
use crate::error::{DepcacheError, DepcacheResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Prefix of the tag every cache entry is published under
pub const TAG_PREFIX: &str = "sha-";

/// Content id of a cache entry (a commit object id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId(String);

impl EntryId {
    /// Parse a hex object id
    pub fn parse(s: &str) -> DepcacheResult<Self> {
        let s = s.trim();
        let valid = (4..=64).contains(&s.len()) && s.chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(DepcacheError::InvalidId(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for messages
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }

    /// Tag this entry is published under
    pub fn tag(&self) -> String {
        format!("{}{}", TAG_PREFIX, self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntryId {
    type Error = DepcacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.0
    }
}

/// Structural hash of an artifact tree, computed by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeHash(String);

impl TreeHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path → blob hash listing of a committed tree
pub type FileListing = BTreeMap<String, String>;

/// Abstract content-addressed store
///
/// Requesting object `id` always yields the same content or a definitive
/// "not found"; store integrity is assumed, not re-verified.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Resolve a tag to the entry it names
    async fn resolve_tag(&self, tag: &str) -> DepcacheResult<Option<EntryId>>;

    /// Whether the entry's commit is present locally
    async fn contains(&self, id: &EntryId) -> DepcacheResult<bool>;

    /// Fetch the entry's tag from the remote; fails with `RemoteMissing`
    async fn fetch(&self, id: &EntryId) -> DepcacheResult<()>;

    /// Structural hash of the entry's tree
    async fn tree_hash_of(&self, id: &EntryId) -> DepcacheResult<TreeHash>;

    /// Read one file of the entry's tree
    async fn blob_at(&self, id: &EntryId, path: &str) -> DepcacheResult<Option<Vec<u8>>>;

    /// List every file of the entry's tree with its blob hash
    async fn list_files(&self, id: &EntryId) -> DepcacheResult<FileListing>;

    /// Commit a payload directory as a new tree and return the commit id
    async fn commit_tree(&self, payload: &ArtifactPayload, message: &str)
        -> DepcacheResult<EntryId>;

    /// Point a tag at an entry
    async fn tag(&self, id: &EntryId, name: &str) -> DepcacheResult<()>;

    /// Publish a tag to the remote
    async fn push(&self, tag: &str) -> DepcacheResult<()>;

    /// Write the entry's tree into `dest` (which must be empty or absent)
    async fn materialize(&self, id: &EntryId, dest: &Path) -> DepcacheResult<()>;

    /// Remote cache repository, if configured
    fn remote(&self) -> Option<&str>;
}

/// Creates throwaway stores for fingerprinting
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn scratch(&self) -> DepcacheResult<Box<dyn ObjectStore>>;
}

/// Make sure `id` is available locally, fetching it from the remote if needed
pub async fn ensure_local(store: &dyn ObjectStore, id: &EntryId) -> DepcacheResult<()> {
    if store.contains(id).await? {
        return Ok(());
    }
    store.fetch(id).await
}
