//! Cache entries as read back from the store

use crate::cache::manifest::Manifest;
use crate::cache::payload::{LOCK_SNAPSHOT, MANIFEST_SNAPSHOT};
use crate::error::DepcacheResult;
use crate::store::{EntryId, FileListing, ObjectStore, TreeHash};

/// One committed cache entry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Commit id in the store
    pub id: EntryId,
    /// Hash of the committed tree, as computed by the store
    pub tree_hash: TreeHash,
    /// Manifest the tree was built from, if the tree records one
    pub manifest_snapshot: Option<Manifest>,
}

impl CacheEntry {
    /// Load an entry that is present in `store`
    pub async fn load(store: &dyn ObjectStore, id: &EntryId) -> DepcacheResult<Self> {
        let tree_hash = store.tree_hash_of(id).await?;
        let manifest_snapshot = store
            .blob_at(id, MANIFEST_SNAPSHOT)
            .await?
            .map(Manifest::from_bytes);

        Ok(Self {
            id: id.clone(),
            tree_hash,
            manifest_snapshot,
        })
    }

    /// Derived lock artifact stored with the entry
    pub async fn lock(&self, store: &dyn ObjectStore) -> DepcacheResult<Option<Vec<u8>>> {
        store.blob_at(&self.id, LOCK_SNAPSHOT).await
    }

    /// Full file listing, used for mismatch diagnostics
    pub async fn files(&self, store: &dyn ObjectStore) -> DepcacheResult<FileListing> {
        store.list_files(&self.id).await
    }
}
