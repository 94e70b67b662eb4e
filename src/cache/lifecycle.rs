//! Lifecycle of the working checkout
//!
//! Every operation takes the current [`CheckoutState`] and returns the state
//! it leaves behind. Only this module mutates the checkout directory, the
//! project pointer, the lock file and the store's tags.

use crate::audit::{AuditEvent, AuditLog};
use crate::cache::checker::ConsistencyChecker;
use crate::cache::checkout::{read_optional, CheckoutMarker, CheckoutState, WorkingCheckout};
use crate::cache::entry::CacheEntry;
use crate::cache::fingerprint::Fingerprinter;
use crate::cache::manifest::Manifest;
use crate::cache::staged::StagedEntry;
use crate::config::schema::ProjectConfig;
use crate::error::{DepcacheError, DepcacheResult};
use crate::installer::Installer;
use crate::project::ProjectRepo;
use crate::store::{ensure_local, EntryId, ObjectStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// How much checking `checkout` does before touching the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Manifest snapshot and fingerprint
    Full,
    /// No check at all (`--force`)
    Skip,
}

/// Result of `push`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed(EntryId),
    NothingStaged,
}

/// What `ensure_fresh` did with the project's lock file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockSync {
    Updated,
    Unchanged,
    NotProvided,
}

/// Snapshot of everything `status` shows
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub manifest_key: Option<String>,
    pub pointer: Option<EntryId>,
    pub checkout: Option<CheckoutMarker>,
    pub staged: Option<StagedEntry>,
    pub remote: Option<String>,
}

/// Orchestrates checkout, install and publication of cache entries
pub struct Lifecycle {
    project: Arc<dyn ProjectRepo>,
    store: Arc<dyn ObjectStore>,
    installer: Arc<dyn Installer>,
    checker: ConsistencyChecker,
    checkout: WorkingCheckout,
    checkout_dir: String,
    manifest_path: PathBuf,
    lockfile_path: PathBuf,
    staged_path: PathBuf,
    audit: AuditLog,
}

impl Lifecycle {
    pub fn new(
        project: Arc<dyn ProjectRepo>,
        store: Arc<dyn ObjectStore>,
        fingerprinter: Fingerprinter,
        layout: &ProjectConfig,
        staged_path: PathBuf,
    ) -> Self {
        let root = project.root().to_path_buf();
        let checkout = WorkingCheckout::new(
            root.join(&layout.checkout_dir),
            project.lingering_paths(&layout.checkout_dir),
        );

        Self {
            installer: fingerprinter.installer().clone(),
            checker: ConsistencyChecker::new(store.clone(), fingerprinter),
            project,
            store,
            checkout,
            checkout_dir: layout.checkout_dir.clone(),
            manifest_path: root.join(&layout.manifest),
            lockfile_path: root.join(&layout.lockfile),
            staged_path,
            audit: AuditLog::disabled(),
        }
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn checkout_dir(&self) -> &Path {
        self.checkout.dir()
    }

    /// Current state of the working checkout
    pub async fn state(&self) -> DepcacheResult<CheckoutState> {
        self.checkout.state().await
    }

    /// Delete the working checkout
    pub async fn remove(&self, state: CheckoutState) -> DepcacheResult<CheckoutState> {
        debug!("Removing checkout ({})", state);
        if self.checkout.clear().await? {
            info!("Removed {}", self.checkout.dir().display());
            self.audit
                .record(AuditEvent::CheckoutRemoved {
                    entry: state.entry().cloned(),
                    dir: self.checkout.dir().to_path_buf(),
                })
                .await;
        }
        Ok(CheckoutState::Absent)
    }

    /// Materialize `target` (default: the project pointer) into the checkout
    ///
    /// Verification failures abort before the checkout directory is touched.
    pub async fn checkout(
        &self,
        state: CheckoutState,
        target: Option<EntryId>,
        verification: Verification,
    ) -> DepcacheResult<CheckoutState> {
        let target = match target {
            Some(id) => id,
            None => self.pointer().await?,
        };

        ensure_local(&*self.store, &target).await?;
        let entry = CacheEntry::load(&*self.store, &target).await?;

        match verification {
            Verification::Skip => debug!("Skipping verification of {}", target.short()),
            Verification::Full => {
                let manifest = Manifest::read(&self.manifest_path).await?;
                self.checker
                    .check(&entry, &manifest)
                    .await?
                    .into_result(&entry)?;
            }
        }

        let state = self.remove(state).await?;
        self.materialize(&entry).await?;
        debug!("Checkout {} -> {}", state, target.short());
        Ok(CheckoutState::Present(target))
    }

    /// Build a new entry from the local manifest and check it out
    pub async fn install(&self, state: CheckoutState) -> DepcacheResult<CheckoutState> {
        let manifest = Manifest::read(&self.manifest_path).await?;
        let state = self.remove(state).await?;
        debug!("Installing {} from state {}", manifest.short_key(), state);

        let workspace =
            TempDir::new().map_err(|e| DepcacheError::io("creating install workspace", e))?;
        let payload = self.installer.install(&manifest, workspace.path()).await?;

        let consumed = payload.manifest_snapshot().await?;
        let mismatch = match consumed {
            None => Some("installer recorded no manifest snapshot".to_string()),
            Some(ref consumed) => consumed.describe_difference(&manifest),
        };
        if let Some(detail) = mismatch {
            return Err(DepcacheError::ManifestMismatch {
                entry: format!("new install of {}", manifest.short_key()),
                detail,
            });
        }

        payload.strip_metadata().await?;
        let id = self
            .store
            .commit_tree(&payload, &format!("depcache: {}", manifest.key()))
            .await?;
        self.store.tag(&id, &id.tag()).await?;
        info!("Created cache entry {} for {}", id.short(), manifest.short_key());

        StagedEntry::new(id.clone(), manifest.key())
            .save(&self.staged_path)
            .await?;
        self.project.stage_pointer(&self.checkout_dir, &id).await?;

        let entry = CacheEntry::load(&*self.store, &id).await?;
        self.materialize(&entry).await?;

        self.audit
            .record(AuditEvent::EntryInstalled {
                entry: id.clone(),
                tree_hash: entry.tree_hash.clone(),
                manifest_key: manifest.key(),
                installer: self.installer.name(),
            })
            .await;

        Ok(CheckoutState::Present(id))
    }

    /// Publish the entry produced by the last `install`
    pub async fn push(&self) -> DepcacheResult<PushOutcome> {
        let Some(staged) = StagedEntry::load(&self.staged_path).await? else {
            return Ok(PushOutcome::NothingStaged);
        };

        let remote = self
            .store
            .remote()
            .ok_or(DepcacheError::RemoteNotConfigured)?
            .to_string();

        self.store.push(&staged.tag).await?;
        StagedEntry::clear(&self.staged_path).await?;
        info!("Pushed {} to {}", staged.tag, remote);

        self.audit
            .record(AuditEvent::EntryPushed {
                entry: staged.entry.clone(),
                tag: staged.tag,
                remote,
            })
            .await;

        Ok(PushOutcome::Pushed(staged.entry))
    }

    /// Bring the checkout in line with the project pointer and sync the lock file
    pub async fn ensure_fresh(
        &self,
        state: CheckoutState,
    ) -> DepcacheResult<(CheckoutState, LockSync)> {
        let pointer = self.pointer().await?;

        let state = if state.entry() == Some(&pointer) {
            state
        } else {
            info!("Checking out {} (was {})", pointer.short(), state);
            self.checkout(state, Some(pointer.clone()), Verification::Full)
                .await?
        };

        let manifest = Manifest::read(&self.manifest_path).await?;
        let snapshot = self.checkout.manifest_snapshot().await?;
        let mismatch = match snapshot {
            None => Some("checkout records no manifest snapshot".to_string()),
            Some(ref snapshot) => snapshot.describe_difference(&manifest),
        };
        if let Some(detail) = mismatch {
            return Err(DepcacheError::ManifestMismatch {
                entry: pointer.to_string(),
                detail,
            });
        }

        ensure_local(&*self.store, &pointer).await?;
        let entry = CacheEntry::load(&*self.store, &pointer).await?;
        let sync = self.sync_lock(&entry).await?;
        Ok((state, sync))
    }

    /// Gather what `status` reports
    pub async fn status(&self) -> DepcacheResult<StatusReport> {
        let manifest_key = match Manifest::read(&self.manifest_path).await {
            Ok(manifest) => Some(manifest.key()),
            Err(DepcacheError::ManifestMissing(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(StatusReport {
            manifest_key,
            pointer: self.project.pointer(&self.checkout_dir).await?,
            checkout: self.checkout.marker().await?,
            staged: StagedEntry::load(&self.staged_path).await?,
            remote: self.store.remote().map(str::to_string),
        })
    }

    async fn pointer(&self) -> DepcacheResult<EntryId> {
        self.project
            .pointer(&self.checkout_dir)
            .await?
            .ok_or_else(|| DepcacheError::NoPointer(self.checkout_dir.clone()))
    }

    async fn materialize(&self, entry: &CacheEntry) -> DepcacheResult<()> {
        self.store.materialize(&entry.id, self.checkout.dir()).await?;
        self.checkout
            .write_marker(&CheckoutMarker::new(entry.id.clone(), entry.tree_hash.clone()))
            .await?;

        self.audit
            .record(AuditEvent::CheckoutMaterialized {
                entry: entry.id.clone(),
                dir: self.checkout.dir().to_path_buf(),
            })
            .await;
        Ok(())
    }

    async fn sync_lock(&self, entry: &CacheEntry) -> DepcacheResult<LockSync> {
        let Some(lock) = entry.lock(&*self.store).await? else {
            return Ok(LockSync::NotProvided);
        };

        if read_optional(&self.lockfile_path).await?.as_deref() == Some(lock.as_slice()) {
            return Ok(LockSync::Unchanged);
        }

        tokio::fs::write(&self.lockfile_path, &lock)
            .await
            .map_err(|e| {
                DepcacheError::io(format!("writing {}", self.lockfile_path.display()), e)
            })?;
        info!("Updated {}", self.lockfile_path.display());
        Ok(LockSync::Updated)
    }
}
