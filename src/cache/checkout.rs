//! Working checkout state
//!
//! The checkout directory holds the materialized tree of exactly one cache
//! entry. Which entry is recorded in a marker file written after the tree is
//! complete, so an interrupted materialization reads back as `Absent`.

use crate::cache::manifest::Manifest;
use crate::cache::payload::{CHECKOUT_MARKER, MANIFEST_SNAPSHOT};
use crate::error::{DepcacheError, DepcacheResult};
use crate::store::{EntryId, TreeHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// State of the working checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Absent,
    Present(EntryId),
}

impl CheckoutState {
    pub fn entry(&self) -> Option<&EntryId> {
        match self {
            Self::Absent => None,
            Self::Present(id) => Some(id),
        }
    }
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Present(id) => write!(f, "present ({})", id.short()),
        }
    }
}

/// Marker record naming the materialized entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutMarker {
    /// Entry the directory holds
    pub entry: EntryId,

    /// Tree hash of that entry
    pub tree_hash: TreeHash,

    /// When the entry was materialized
    pub checked_out_at: DateTime<Utc>,
}

impl CheckoutMarker {
    pub fn new(entry: EntryId, tree_hash: TreeHash) -> Self {
        Self {
            entry,
            tree_hash,
            checked_out_at: Utc::now(),
        }
    }
}

/// The checkout directory plus any leftovers of other checkout mechanisms
#[derive(Debug, Clone)]
pub struct WorkingCheckout {
    dir: PathBuf,
    lingering: Vec<PathBuf>,
}

impl WorkingCheckout {
    pub fn new(dir: impl Into<PathBuf>, lingering: Vec<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lingering,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker_path(&self) -> PathBuf {
        self.dir.join(CHECKOUT_MARKER)
    }

    /// Current state, read from the marker
    pub async fn state(&self) -> DepcacheResult<CheckoutState> {
        Ok(match self.marker().await? {
            Some(marker) => CheckoutState::Present(marker.entry),
            None => CheckoutState::Absent,
        })
    }

    /// Load the marker, if the directory holds a complete checkout
    pub async fn marker(&self) -> DepcacheResult<Option<CheckoutMarker>> {
        let path = self.marker_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DepcacheError::io(
                    format!("reading checkout marker {}", path.display()),
                    e,
                ))
            }
        };

        match serde_json::from_str(&content) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                warn!("Ignoring unreadable checkout marker {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Record the materialized entry
    pub async fn write_marker(&self, marker: &CheckoutMarker) -> DepcacheResult<()> {
        let path = self.marker_path();
        let content = serde_json::to_string_pretty(marker)?;
        fs::write(&path, content)
            .await
            .map_err(|e| DepcacheError::io(format!("writing checkout marker {}", path.display()), e))
    }

    /// Delete the checkout and lingering substructure; returns whether anything was removed
    pub async fn clear(&self) -> DepcacheResult<bool> {
        let mut removed = false;
        for path in std::iter::once(&self.dir).chain(self.lingering.iter()) {
            if remove_all(path).await? {
                debug!("Removed {}", path.display());
                removed = true;
            }
        }
        Ok(removed)
    }

    /// Manifest snapshot of the materialized entry
    pub async fn manifest_snapshot(&self) -> DepcacheResult<Option<Manifest>> {
        Ok(self.read_optional(MANIFEST_SNAPSHOT).await?.map(Manifest::from_bytes))
    }

    async fn read_optional(&self, rel: &str) -> DepcacheResult<Option<Vec<u8>>> {
        read_optional(&self.dir.join(rel)).await
    }
}

/// Read a file, mapping "not found" to `None`
pub(crate) async fn read_optional(path: &Path) -> DepcacheResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DepcacheError::io(format!("reading {}", path.display()), e)),
    }
}

async fn remove_all(path: &Path) -> DepcacheResult<bool> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(DepcacheError::io(format!("inspecting {}", path.display()), e)),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    result
        .map(|_| true)
        .map_err(|e| DepcacheError::io(format!("removing {}", path.display()), e))
}
