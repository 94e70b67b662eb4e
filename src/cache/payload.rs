//! Artifact payloads
//!
//! An [`ArtifactPayload`] is a directory holding one artifact tree in the
//! layout committed to the store:
//!
//! ```text
//! <payload>/
//!   <installed files ...>
//!   .depcache/manifest     manifest as consumed by the installer
//!   .depcache/lock         derived lock artifact, when produced
//! ```
//!
//! `.git` entries and the checkout marker are store-internal metadata and
//! are stripped before a payload is hashed or committed.

use crate::cache::manifest::Manifest;
use crate::error::{DepcacheError, DepcacheResult};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Directory inside the tree holding the protocol's own files
pub const SNAPSHOT_DIR: &str = ".depcache";

/// Tree path of the manifest snapshot
pub const MANIFEST_SNAPSHOT: &str = ".depcache/manifest";

/// Tree path of the derived lock artifact
pub const LOCK_SNAPSHOT: &str = ".depcache/lock";

/// Marker written into a working checkout naming the tracked entry
pub const CHECKOUT_MARKER: &str = ".depcache-checkout.json";

/// One node of a payload tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadNode {
    File { contents: Vec<u8>, executable: bool },
    Symlink { target: PathBuf },
}

/// A payload directory on disk
#[derive(Debug, Clone)]
pub struct ArtifactPayload {
    root: PathBuf,
}

impl ArtifactPayload {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Manifest snapshot recorded by the installer
    pub async fn manifest_snapshot(&self) -> DepcacheResult<Option<Manifest>> {
        Ok(self
            .read_optional(MANIFEST_SNAPSHOT)
            .await?
            .map(Manifest::from_bytes))
    }

    /// Derived lock artifact, if the installer produced one
    pub async fn lock(&self) -> DepcacheResult<Option<Vec<u8>>> {
        self.read_optional(LOCK_SNAPSHOT).await
    }

    /// Record the manifest snapshot and lock artifact into the payload
    pub async fn write_snapshots(
        &self,
        manifest: &Manifest,
        lock: Option<&[u8]>,
    ) -> DepcacheResult<()> {
        let dir = self.root.join(SNAPSHOT_DIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DepcacheError::io(format!("creating {}", dir.display()), e))?;

        let path = self.root.join(MANIFEST_SNAPSHOT);
        tokio::fs::write(&path, manifest.bytes())
            .await
            .map_err(|e| DepcacheError::io(format!("writing {}", path.display()), e))?;
        if let Some(lock) = lock {
            let path = self.root.join(LOCK_SNAPSHOT);
            tokio::fs::write(&path, lock)
                .await
                .map_err(|e| DepcacheError::io(format!("writing {}", path.display()), e))?;
        }
        Ok(())
    }

    /// Remove store-internal metadata; returns how many entries were removed
    pub async fn strip_metadata(&self) -> DepcacheResult<usize> {
        let root = self.root.clone();
        blocking("stripping payload metadata", move || {
            let mut removed = 0;
            let marker = root.join(CHECKOUT_MARKER);
            if marker.exists() {
                remove_path(&marker)?;
                removed += 1;
            }
            removed += strip_git_entries(&root)?;
            Ok(removed)
        })
        .await
    }

    /// Walk the payload into a sorted path → node map
    pub async fn nodes(&self) -> DepcacheResult<BTreeMap<String, PayloadNode>> {
        let root = self.root.clone();
        blocking("walking payload", move || {
            let mut nodes = BTreeMap::new();
            if root.exists() {
                collect_nodes(&root, &root, &mut nodes)?;
            }
            Ok(nodes)
        })
        .await
    }

    async fn read_optional(&self, rel: &str) -> DepcacheResult<Option<Vec<u8>>> {
        let path = self.root.join(rel);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DepcacheError::io(format!("reading {}", path.display()), e)),
        }
    }
}

/// Run a recursive filesystem walk off the async workers
async fn blocking<T, F>(what: &str, f: F) -> DepcacheResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> DepcacheResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DepcacheError::Internal(format!("{what}: {e}")))?
}

/// Whether a tree path is store-internal metadata
pub fn is_metadata(rel: &str) -> bool {
    rel == CHECKOUT_MARKER || rel.split('/').any(|component| component == ".git")
}

/// Write a node map out under `dest`
pub async fn write_nodes(dest: &Path, nodes: &BTreeMap<String, PayloadNode>) -> DepcacheResult<()> {
    let dest = dest.to_path_buf();
    let nodes = nodes.clone();
    blocking("writing payload", move || write_nodes_sync(&dest, &nodes)).await
}

fn write_nodes_sync(dest: &Path, nodes: &BTreeMap<String, PayloadNode>) -> DepcacheResult<()> {
    fs::create_dir_all(dest)
        .map_err(|e| DepcacheError::io(format!("creating {}", dest.display()), e))?;

    for (rel, node) in nodes {
        let path = dest.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DepcacheError::io(format!("creating {}", parent.display()), e))?;
        }
        match node {
            PayloadNode::File {
                contents,
                executable,
            } => {
                write_file(&path, contents)?;
                if *executable {
                    set_executable(&path)?;
                }
            }
            PayloadNode::Symlink { target } => create_symlink(target, &path)?,
        }
    }
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> DepcacheResult<()> {
    fs::write(path, contents).map_err(|e| DepcacheError::io(format!("writing {}", path.display()), e))
}

fn remove_path(path: &Path) -> DepcacheResult<()> {
    let meta = fs::symlink_metadata(path)
        .map_err(|e| DepcacheError::io(format!("inspecting {}", path.display()), e))?;
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| DepcacheError::io(format!("removing {}", path.display()), e))
}

fn strip_git_entries(dir: &Path) -> DepcacheResult<usize> {
    let mut removed = 0;
    let entries =
        fs::read_dir(dir).map_err(|e| DepcacheError::io(format!("reading {}", dir.display()), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| DepcacheError::io(format!("reading {}", dir.display()), e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| DepcacheError::io(format!("inspecting {}", path.display()), e))?;

        if entry.file_name() == ".git" {
            remove_path(&path)?;
            removed += 1;
        } else if file_type.is_dir() {
            removed += strip_git_entries(&path)?;
        }
    }
    Ok(removed)
}

fn collect_nodes(
    root: &Path,
    dir: &Path,
    nodes: &mut BTreeMap<String, PayloadNode>,
) -> DepcacheResult<()> {
    let entries =
        fs::read_dir(dir).map_err(|e| DepcacheError::io(format!("reading {}", dir.display()), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| DepcacheError::io(format!("reading {}", dir.display()), e))?;
        let path = entry.path();
        let rel = relative_path(root, &path)?;
        if is_metadata(&rel) {
            continue;
        }

        let meta = fs::symlink_metadata(&path)
            .map_err(|e| DepcacheError::io(format!("inspecting {}", path.display()), e))?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&path)
                .map_err(|e| DepcacheError::io(format!("reading link {}", path.display()), e))?;
            nodes.insert(rel, PayloadNode::Symlink { target });
        } else if meta.is_dir() {
            collect_nodes(root, &path, nodes)?;
        } else {
            let contents = fs::read(&path)
                .map_err(|e| DepcacheError::io(format!("reading {}", path.display()), e))?;
            nodes.insert(
                rel,
                PayloadNode::File {
                    contents,
                    executable: is_executable(&meta),
                },
            );
        }
    }
    Ok(())
}

fn relative_path(root: &Path, path: &Path) -> DepcacheResult<String> {
    let rel = path.strip_prefix(root).map_err(|_| DepcacheError::PathInvalid {
        path: path.to_path_buf(),
        reason: format!("outside payload root {}", root.display()),
    })?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn set_executable(path: &Path) -> DepcacheResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| DepcacheError::io(format!("setting mode of {}", path.display()), e))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> DepcacheResult<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> DepcacheResult<()> {
    std::os::unix::fs::symlink(target, link)
        .map_err(|e| DepcacheError::io(format!("creating symlink {}", link.display()), e))
}

#[cfg(not(unix))]
fn create_symlink(target: &Path, link: &Path) -> DepcacheResult<()> {
    Err(DepcacheError::PathInvalid {
        path: link.to_path_buf(),
        reason: format!("symlinks to {} are unsupported on this platform", target.display()),
    })
}
