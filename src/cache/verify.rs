//! Verification of the cache entries a range of project commits points at
//!
//! Walks `base..head` oldest first, visiting only commits that touch the
//! manifest or the checkout pointer, and checks each pointed-at entry
//! against the manifest of that commit. The first failure aborts the walk.

use crate::cache::checker::ConsistencyChecker;
use crate::cache::entry::CacheEntry;
use crate::cache::fingerprint::{Fingerprint, Fingerprinter};
use crate::cache::manifest::Manifest;
use crate::config::schema::ProjectConfig;
use crate::error::{DepcacheError, DepcacheResult};
use crate::project::ProjectRepo;
use crate::store::{ensure_local, EntryId, ObjectStore};
use std::sync::Arc;
use tracing::info;

/// One commit that passed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCommit {
    pub revision: String,
    pub entry: EntryId,
}

pub struct VerificationJob {
    project: Arc<dyn ProjectRepo>,
    store: Arc<dyn ObjectStore>,
    checker: ConsistencyChecker,
    manifest: String,
    checkout_dir: String,
}

impl VerificationJob {
    /// Fingerprints are memoized per manifest for the lifetime of the job
    pub fn new(
        project: Arc<dyn ProjectRepo>,
        store: Arc<dyn ObjectStore>,
        fingerprinter: Fingerprinter,
        layout: &ProjectConfig,
    ) -> Self {
        Self {
            checker: ConsistencyChecker::new(store.clone(), fingerprinter.memoized()),
            project,
            store,
            manifest: layout.manifest.clone(),
            checkout_dir: layout.checkout_dir.clone(),
        }
    }

    /// Verify every relevant commit in `base..head`
    pub async fn run(&self, base: &str, head: &str) -> DepcacheResult<Vec<VerifiedCommit>> {
        let commits = self
            .project
            .history(base, head, &[self.manifest.as_str(), self.checkout_dir.as_str()])
            .await?;
        info!("Verifying {} commit(s) in {}..{}", commits.len(), base, head);

        let mut verified = Vec::with_capacity(commits.len());
        for revision in commits {
            let entry = self
                .verify_commit(&revision)
                .await
                .map_err(|e| DepcacheError::VerificationFailed {
                    revision: revision.clone(),
                    source: Box::new(e),
                })?;
            info!("{}: entry {} ok", revision, entry.short());
            verified.push(VerifiedCommit { revision, entry });
        }
        Ok(verified)
    }

    /// Expected tree hash of the manifest at `revision`
    pub async fn tree_hash_at(&self, revision: &str) -> DepcacheResult<Fingerprint> {
        let manifest = self.manifest_at(revision).await?;
        self.checker.fingerprinter().expected_hash(&manifest).await
    }

    async fn verify_commit(&self, revision: &str) -> DepcacheResult<EntryId> {
        let id = self
            .project
            .pointer_at(revision, &self.checkout_dir)
            .await?
            .ok_or_else(|| DepcacheError::PointerMissingAt {
                dir: self.checkout_dir.clone(),
                revision: revision.to_string(),
            })?;
        let manifest = self.manifest_at(revision).await?;

        ensure_local(&*self.store, &id).await?;
        let entry = CacheEntry::load(&*self.store, &id).await?;
        self.checker
            .check(&entry, &manifest)
            .await?
            .into_result(&entry)?;
        Ok(id)
    }

    async fn manifest_at(&self, revision: &str) -> DepcacheResult<Manifest> {
        self.project
            .file_at(revision, &self.manifest)
            .await?
            .map(Manifest::from_bytes)
            .ok_or_else(|| DepcacheError::ManifestMissingAt {
                manifest: self.manifest.clone(),
                revision: revision.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::{install_entry, FakeProject};
    use crate::installer::stub::StubInstaller;
    use crate::store::{MemoryStore, MemoryStoreFactory};

    const M0: &str = r#"{"deps":{}}"#;
    const M1: &str = r#"{"deps":{"a":"1.0"}}"#;
    const M2: &str = r#"{"deps":{"a":"2.0"}}"#;

    fn job(project: FakeProject, remote: &MemoryStore) -> (VerificationJob, Arc<FakeProject>) {
        let project = Arc::new(project);
        let store = MemoryStore::with_remote(remote, "origin");
        let fingerprinter =
            Fingerprinter::new(Arc::new(StubInstaller::new()), Arc::new(MemoryStoreFactory));
        let job = VerificationJob::new(
            project.clone(),
            Arc::new(store),
            fingerprinter,
            &ProjectConfig::default(),
        );
        (job, project)
    }

    #[tokio::test]
    async fn verifies_consistent_history() {
        let remote = MemoryStore::new();
        let m1 = Manifest::from_bytes(M1);
        let m2 = Manifest::from_bytes(M2);
        let e1 = install_entry(&remote, &m1).await;
        let e2 = install_entry(&remote, &m2).await;

        let mut project = FakeProject::new();
        project.commit("c0", &Manifest::from_bytes(M0), None);
        project.commit("c1", &m1, Some(&e1.id));
        project.commit("c2", &m2, Some(&e2.id));
        let (job, _) = job(project, &remote);

        let report = job.run("c0", "c2").await.unwrap();

        assert_eq!(
            report,
            vec![
                VerifiedCommit {
                    revision: "c1".to_string(),
                    entry: e1.id,
                },
                VerifiedCommit {
                    revision: "c2".to_string(),
                    entry: e2.id,
                },
            ]
        );
    }

    #[tokio::test]
    async fn stops_at_first_bad_commit() {
        let remote = MemoryStore::new();
        let m1 = Manifest::from_bytes(M1);
        let m2 = Manifest::from_bytes(M2);
        let e1 = install_entry(&remote, &m1).await;
        let e3 = install_entry(&remote, &m2).await;

        // c2 changes the manifest but keeps the old pointer
        let mut project = FakeProject::new();
        project.commit("c0", &Manifest::from_bytes(M0), None);
        project.commit("c1", &m1, Some(&e1.id));
        project.commit("c2", &m2, Some(&e1.id));
        project.commit("c3", &m2, Some(&e3.id));
        let (job, project) = job(project, &remote);

        let err = job.run("c0", "c3").await.unwrap_err();

        match err {
            DepcacheError::VerificationFailed { ref revision, .. } => assert_eq!(revision, "c2"),
            ref other => panic!("expected verification failure, got {other:?}"),
        }
        assert!(err.is_consistency_failure());
        assert!(!project.reads.lock().unwrap().contains(&"c3".to_string()));
    }

    #[tokio::test]
    async fn commit_without_pointer_fails() {
        let remote = MemoryStore::new();
        let mut project = FakeProject::new();
        project.commit("c0", &Manifest::from_bytes(M0), None);
        project.commit("c1", &Manifest::from_bytes(M1), None);
        let (job, _) = job(project, &remote);

        let err = job.run("c0", "c1").await.unwrap_err();
        assert!(matches!(err.root(), DepcacheError::PointerMissingAt { .. }));
    }

    #[tokio::test]
    async fn unpublished_entry_fails() {
        let remote = MemoryStore::new();
        let local_only = MemoryStore::new();
        let m1 = Manifest::from_bytes(M1);
        let e1 = install_entry(&local_only, &m1).await;

        let mut project = FakeProject::new();
        project.commit("c0", &Manifest::from_bytes(M0), None);
        project.commit("c1", &m1, Some(&e1.id));
        let (job, _) = job(project, &remote);

        let err = job.run("c0", "c1").await.unwrap_err();
        assert!(matches!(err.root(), DepcacheError::RemoteMissing { .. }));
    }

    #[tokio::test]
    async fn tree_hash_at_matches_installed_entry() {
        let remote = MemoryStore::new();
        let m1 = Manifest::from_bytes(M1);
        let e1 = install_entry(&remote, &m1).await;

        let mut project = FakeProject::new();
        project.commit("c1", &m1, Some(&e1.id));
        let (job, _) = job(project, &remote);

        let fingerprint = job.tree_hash_at("c1").await.unwrap();
        assert_eq!(fingerprint.tree_hash, e1.tree_hash);

        let err = job.tree_hash_at("missing").await.unwrap_err();
        assert!(matches!(err, DepcacheError::ManifestMissingAt { .. }));
    }
}
