//! Record of the entry produced by the last `install`
//!
//! `install` and `push` run as separate invocations, so the entry awaiting
//! publication is persisted as a small JSON file next to the local store.

use crate::error::{DepcacheError, DepcacheResult};
use crate::store::EntryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// File name of the staged record inside the store directory
pub const STAGED_RECORD: &str = "depcache-staged.json";

/// An installed entry not yet pushed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEntry {
    /// Entry id
    pub entry: EntryId,

    /// Tag to publish
    pub tag: String,

    /// Key of the manifest the entry was built from
    pub manifest_key: String,

    /// When `install` produced it
    pub created_at: DateTime<Utc>,
}

impl StagedEntry {
    pub fn new(entry: EntryId, manifest_key: String) -> Self {
        Self {
            tag: entry.tag(),
            entry,
            manifest_key,
            created_at: Utc::now(),
        }
    }

    /// Load the staged record, if any
    pub async fn load(path: &Path) -> DepcacheResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| DepcacheError::io(format!("reading staged entry {}", path.display()), e))?;

        let staged: StagedEntry = serde_json::from_str(&content)?;
        Ok(Some(staged))
    }

    /// Save the record, replacing any previous one
    pub async fn save(&self, path: &Path) -> DepcacheResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DepcacheError::io("creating store directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .await
            .map_err(|e| DepcacheError::io(format!("writing staged entry {}", path.display()), e))
    }

    /// Delete the record
    pub async fn clear(path: &Path) -> DepcacheResult<()> {
        if path.exists() {
            fs::remove_file(path).await.map_err(|e| {
                DepcacheError::io(format!("deleting staged entry {}", path.display()), e)
            })?;
        }
        Ok(())
    }
}
