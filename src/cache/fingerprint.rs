//! Fingerprint calculation
//!
//! The fingerprint of a manifest is the tree hash a fresh hermetic install
//! of it produces. Computing one is as expensive as a full install.

use crate::cache::manifest::Manifest;
use crate::error::{DepcacheError, DepcacheResult};
use crate::installer::Installer;
use crate::store::{FileListing, StoreFactory, TreeHash};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::{debug, info};

/// Expected tree of a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub tree_hash: TreeHash,
    /// Path → blob hash listing, for diffs against a candidate tree
    pub files: FileListing,
}

/// Computes fingerprints by installing into a throwaway store
#[derive(Clone)]
pub struct Fingerprinter {
    installer: Arc<dyn Installer>,
    scratch: Arc<dyn StoreFactory>,
    memo: Option<Arc<Mutex<HashMap<String, Fingerprint>>>>,
}

impl Fingerprinter {
    pub fn new(installer: Arc<dyn Installer>, scratch: Arc<dyn StoreFactory>) -> Self {
        Self {
            installer,
            scratch,
            memo: None,
        }
    }

    /// Reuse fingerprints per manifest key for the lifetime of this value
    pub fn memoized(mut self) -> Self {
        self.memo = Some(Arc::default());
        self
    }

    pub fn installer(&self) -> &Arc<dyn Installer> {
        &self.installer
    }

    /// Expected tree hash of `manifest`
    pub async fn expected_hash(&self, manifest: &Manifest) -> DepcacheResult<Fingerprint> {
        let key = manifest.key();
        if let Some(hit) = self.cached(&key) {
            debug!("Fingerprint cache hit for {}", manifest.short_key());
            return Ok(hit);
        }

        info!(
            "Computing fingerprint of {} with {}",
            manifest.short_key(),
            self.installer.name()
        );

        let workspace =
            TempDir::new().map_err(|e| DepcacheError::io("creating fingerprint workspace", e))?;
        let payload = self.installer.install(manifest, workspace.path()).await?;
        let stripped = payload.strip_metadata().await?;
        if stripped > 0 {
            debug!("Stripped {} metadata entries from payload", stripped);
        }

        let store = self.scratch.scratch().await?;
        let id = store
            .commit_tree(&payload, &format!("depcache fingerprint: {key}"))
            .await?;
        let fingerprint = Fingerprint {
            tree_hash: store.tree_hash_of(&id).await?,
            files: store.list_files(&id).await?,
        };

        if let Some(ref memo) = self.memo {
            memo.lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key, fingerprint.clone());
        }
        Ok(fingerprint)
    }

    fn cached(&self, key: &str) -> Option<Fingerprint> {
        let memo = self.memo.as_ref()?;
        let memo = memo.lock().unwrap_or_else(|e| e.into_inner());
        memo.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::stub::StubInstaller;
    use crate::store::MemoryStoreFactory;

    fn fingerprinter(installer: Arc<StubInstaller>) -> Fingerprinter {
        Fingerprinter::new(installer, Arc::new(MemoryStoreFactory))
    }

    #[tokio::test]
    async fn stable_across_calls() {
        let installer = Arc::new(StubInstaller::new());
        let fp = fingerprinter(installer.clone());
        let manifest = Manifest::from_bytes(r#"{"deps":{"a":"1.0","b":"2.1"}}"#);

        let first = fp.expected_hash(&manifest).await.unwrap();
        let second = fp.expected_hash(&manifest).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(installer.calls(), 2);
    }

    #[tokio::test]
    async fn different_manifests_differ() {
        let fp = fingerprinter(Arc::new(StubInstaller::new()));
        let a = fp
            .expected_hash(&Manifest::from_bytes(r#"{"deps":{"a":"1.0"}}"#))
            .await
            .unwrap();
        let b = fp
            .expected_hash(&Manifest::from_bytes(r#"{"deps":{"a":"2.0"}}"#))
            .await
            .unwrap();
        assert_ne!(a.tree_hash, b.tree_hash);
    }

    #[tokio::test]
    async fn memoized_installs_once() {
        let installer = Arc::new(StubInstaller::new());
        let fp = fingerprinter(installer.clone()).memoized();
        let manifest = Manifest::from_bytes(r#"{"deps":{"a":"1.0"}}"#);

        fp.expected_hash(&manifest).await.unwrap();
        fp.expected_hash(&manifest).await.unwrap();

        assert_eq!(installer.calls(), 1);
    }

    #[tokio::test]
    async fn installer_failure_propagates() {
        let installer = Arc::new(StubInstaller::failing());
        let err = fingerprinter(installer)
            .expected_hash(&Manifest::from_bytes("{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, DepcacheError::ExternalProcess { .. }));
    }
}
