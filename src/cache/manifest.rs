//! Dependency manifest snapshots
//!
//! A manifest is identified by its exact bytes. Its SHA-256 digest is the
//! manifest key recorded in cache entry commit messages.

use crate::error::{DepcacheError, DepcacheResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Immutable manifest contents
#[derive(Clone, PartialEq, Eq)]
pub struct Manifest {
    bytes: Vec<u8>,
}

impl Manifest {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Read a manifest file, reporting a missing file as `ManifestMissing`
    pub async fn read(path: &Path) -> DepcacheResult<Self> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Self { bytes }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(DepcacheError::ManifestMissing(path.to_path_buf()))
            }
            Err(e) => Err(DepcacheError::io(
                format!("reading manifest {}", path.display()),
                e,
            )),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Full SHA-256 hex digest of the contents
    pub fn key(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    /// First 12 hex chars of the key
    pub fn short_key(&self) -> String {
        self.key()[..12].to_string()
    }

    /// Describe how `other` differs from `self`, or `None` if identical
    pub fn describe_difference(&self, other: &Manifest) -> Option<String> {
        if self == other {
            return None;
        }

        let ours = String::from_utf8_lossy(&self.bytes);
        let theirs = String::from_utf8_lossy(&other.bytes);
        let mut ours_lines = ours.lines();
        let mut theirs_lines = theirs.lines();
        let mut line = 1;

        let first = loop {
            match (ours_lines.next(), theirs_lines.next()) {
                (Some(a), Some(b)) if a == b => line += 1,
                (None, None) => break None,
                (a, b) => break Some((a.unwrap_or("<end of file>"), b.unwrap_or("<end of file>"))),
            }
        };

        let mut detail = format!(
            "snapshot {} differs from reference {}",
            self.short_key(),
            other.short_key()
        );
        match first {
            Some((a, b)) => {
                detail.push_str(&format!("\n  line {line}:\n  - {a}\n  + {b}"));
            }
            // Same lines, different bytes (line endings or trailing newline)
            None => detail.push_str("\n  (whitespace or line ending difference)"),
        }
        Some(detail)
    }
}

impl fmt::Debug for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manifest")
            .field("key", &self.short_key())
            .field("len", &self.bytes.len())
            .finish()
    }
}
