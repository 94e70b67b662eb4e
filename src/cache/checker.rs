//! Consistency checking of cache entries against a manifest
//!
//! A candidate entry is consistent with a reference manifest when its stored
//! manifest snapshot is byte-identical to the reference and its tree hash
//! equals the reference's fingerprint. Checks short-circuit in that order,
//! so the expensive fingerprint only runs once the cheap comparison passes.

use crate::cache::entry::CacheEntry;
use crate::cache::fingerprint::Fingerprinter;
use crate::cache::manifest::Manifest;
use crate::error::{DepcacheError, DepcacheResult};
use crate::store::{FileListing, ObjectStore, TreeHash};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Max number of paths listed in a tree diff
const DIFF_MAX_PATHS: usize = 50;

/// Outcome of a consistency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Consistent,
    ManifestMismatch {
        detail: String,
    },
    TreeMismatch {
        expected: TreeHash,
        actual: TreeHash,
        diff: TreeDiff,
    },
}

impl Verdict {
    pub fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }

    /// Turn a mismatch into the matching error for `entry`
    pub fn into_result(self, entry: &CacheEntry) -> DepcacheResult<()> {
        match self {
            Self::Consistent => Ok(()),
            Self::ManifestMismatch { detail } => Err(DepcacheError::ManifestMismatch {
                entry: entry.id.to_string(),
                detail,
            }),
            Self::TreeMismatch {
                expected,
                actual,
                diff,
            } => Err(DepcacheError::TreeMismatch {
                entry: entry.id.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
                diff: diff.to_string(),
            }),
        }
    }
}

/// File-level difference between an expected and an actual tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    /// In the cached entry but not in a fresh install
    pub added: Vec<String>,
    /// In a fresh install but missing from the cached entry
    pub removed: Vec<String>,
    /// Present in both with different content or mode
    pub changed: Vec<String>,
}

impl TreeDiff {
    pub fn between(expected: &FileListing, actual: &FileListing) -> Self {
        let mut diff = Self::default();
        for (path, hash) in actual {
            match expected.get(path) {
                None => diff.added.push(path.clone()),
                Some(other) if other != hash => diff.changed.push(path.clone()),
                Some(_) => {}
            }
        }
        diff.removed = expected
            .keys()
            .filter(|path| !actual.contains_key(*path))
            .cloned()
            .collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

impl fmt::Display for TreeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "  (no file-level differences)");
        }

        let lines = self
            .changed
            .iter()
            .map(|p| ("~", p))
            .chain(self.removed.iter().map(|p| ("-", p)))
            .chain(self.added.iter().map(|p| ("+", p)));

        for (marker, path) in lines.take(DIFF_MAX_PATHS) {
            writeln!(f, "  {marker} {path}")?;
        }
        if self.len() > DIFF_MAX_PATHS {
            writeln!(f, "  ... and {} more", self.len() - DIFF_MAX_PATHS)?;
        }
        write!(
            f,
            "  ({} changed, {} missing from entry, {} unexpected in entry)",
            self.changed.len(),
            self.removed.len(),
            self.added.len()
        )
    }
}

/// Compares cache entries in a store against reference manifests
#[derive(Clone)]
pub struct ConsistencyChecker {
    store: Arc<dyn ObjectStore>,
    fingerprinter: Fingerprinter,
}

impl ConsistencyChecker {
    pub fn new(store: Arc<dyn ObjectStore>, fingerprinter: Fingerprinter) -> Self {
        Self {
            store,
            fingerprinter,
        }
    }

    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    /// Compare only the manifest snapshot (no install)
    pub fn check_manifest(entry: &CacheEntry, reference: &Manifest) -> Verdict {
        match entry.manifest_snapshot {
            None => Verdict::ManifestMismatch {
                detail: format!(
                    "entry records no manifest snapshot; reference is {}",
                    reference.short_key()
                ),
            },
            Some(ref snapshot) => match snapshot.describe_difference(reference) {
                Some(detail) => Verdict::ManifestMismatch { detail },
                None => Verdict::Consistent,
            },
        }
    }

    /// Full check: manifest snapshot, then tree hash against the fingerprint
    pub async fn check(&self, entry: &CacheEntry, reference: &Manifest) -> DepcacheResult<Verdict> {
        let verdict = Self::check_manifest(entry, reference);
        if !verdict.is_consistent() {
            return Ok(verdict);
        }

        let expected = self.fingerprinter.expected_hash(reference).await?;
        if expected.tree_hash == entry.tree_hash {
            debug!("Entry {} matches fingerprint {}", entry.id.short(), expected.tree_hash);
            return Ok(Verdict::Consistent);
        }

        let actual_files = entry.files(&*self.store).await?;
        Ok(Verdict::TreeMismatch {
            diff: TreeDiff::between(&expected.files, &actual_files),
            expected: expected.tree_hash,
            actual: entry.tree_hash.clone(),
        })
    }
}
