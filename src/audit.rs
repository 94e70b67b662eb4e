//! Provenance log of cache lifecycle events
//!
//! Every entry built, published, checked out or removed is appended as one
//! JSON line to `general.audit_path` (default
//! `~/.local/state/depcache/audit.log`), so the origin of any tree in a
//! checkout can be traced back to the install that produced it.

use crate::config::{schema::Config, ConfigManager};
use crate::store::{EntryId, TreeHash};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// One lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum AuditEvent {
    #[serde(rename = "entry.installed")]
    EntryInstalled {
        entry: EntryId,
        tree_hash: TreeHash,
        manifest_key: String,
        installer: String,
    },

    #[serde(rename = "entry.pushed")]
    EntryPushed {
        entry: EntryId,
        tag: String,
        remote: String,
    },

    #[serde(rename = "checkout.materialized")]
    CheckoutMaterialized { entry: EntryId, dir: PathBuf },

    #[serde(rename = "checkout.removed")]
    CheckoutRemoved {
        entry: Option<EntryId>,
        dir: PathBuf,
    },
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Append-only JSON-lines sink for [`AuditEvent`]s
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Log configured by `[general]`; disabled when `audit_log = false`
    pub fn new(config: &Config) -> Self {
        let path = config.general.audit_log.then(|| {
            config
                .general
                .audit_path
                .clone()
                .unwrap_or_else(ConfigManager::audit_log_path)
        });
        Self { path }
    }

    /// Log that records nothing
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Append `event`; IO failures only warn
    pub async fn record(&self, event: AuditEvent) {
        let Some(ref path) = self.path else {
            return;
        };

        let record = AuditRecord {
            timestamp: Utc::now(),
            event: &event,
        };
        let mut line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Cannot encode audit event {:?}: {}", event, e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = append(path, &line).await {
            warn!("Cannot write audit log {}: {}", path.display(), e);
        }
    }
}

async fn append(path: &std::path::Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry() -> EntryId {
        EntryId::parse("0123456789abcdef0123456789abcdef01234567").unwrap()
    }

    fn log_at(dir: &TempDir, enabled: bool) -> (AuditLog, PathBuf) {
        let path = dir.path().join("logs/audit.log");
        let mut config = Config::default();
        config.general.audit_log = enabled;
        config.general.audit_path = Some(path.clone());
        (AuditLog::new(&config), path)
    }

    fn read_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn installed_event_is_flat_json() {
        let dir = TempDir::new().unwrap();
        let (audit, path) = log_at(&dir, true);

        audit
            .record(AuditEvent::EntryInstalled {
                entry: entry(),
                tree_hash: TreeHash::new("4b825dc6"),
                manifest_key: "ab12".to_string(),
                installer: "stub".to_string(),
            })
            .await;

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event"], "entry.installed");
        assert_eq!(lines[0]["entry"], entry().as_str());
        assert_eq!(lines[0]["tree_hash"], "4b825dc6");
        assert!(lines[0]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn events_append_in_order() {
        let dir = TempDir::new().unwrap();
        let (audit, path) = log_at(&dir, true);

        audit
            .record(AuditEvent::CheckoutRemoved {
                entry: None,
                dir: PathBuf::from("/work/app/node_modules"),
            })
            .await;
        audit
            .record(AuditEvent::CheckoutMaterialized {
                entry: entry(),
                dir: PathBuf::from("/work/app/node_modules"),
            })
            .await;

        let events: Vec<_> = read_lines(&path)
            .into_iter()
            .map(|l| l["event"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(events, vec!["checkout.removed", "checkout.materialized"]);
    }

    #[tokio::test]
    async fn disabled_log_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (audit, path) = log_at(&dir, false);

        audit
            .record(AuditEvent::EntryPushed {
                entry: entry(),
                tag: entry().tag(),
                remote: "origin".to_string(),
            })
            .await;

        assert!(!path.exists());
    }

    #[test]
    #[serial_test::serial]
    fn default_path_comes_from_state_dir() {
        let audit = AuditLog::new(&Config::default());
        assert_eq!(audit.path, Some(ConfigManager::audit_log_path()));
    }
}
