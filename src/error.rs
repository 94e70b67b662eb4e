//! Error types for depcache
//!
//! All modules use `DepcacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for depcache operations
pub type DepcacheResult<T> = Result<T, DepcacheError>;

/// All errors that can occur in depcache
#[derive(Error, Debug)]
pub enum DepcacheError {
    // Usage errors
    #[error("{0}")]
    Usage(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("No remote cache repository configured")]
    RemoteNotConfigured,

    // Project errors
    #[error("Not inside a git repository: {0}")]
    NotAGitRepository(PathBuf),

    #[error("Manifest not found: {0}")]
    ManifestMissing(PathBuf),

    #[error("Manifest {manifest} not present at revision {revision}")]
    ManifestMissingAt { manifest: String, revision: String },

    #[error("No cache pointer recorded for {0} in the project index")]
    NoPointer(String),

    #[error("No cache pointer for {dir} at revision {revision}")]
    PointerMissingAt { dir: String, revision: String },

    // Cache protocol errors
    #[error("Cache entry {id} not found in remote {remote}")]
    RemoteMissing { id: String, remote: String },

    #[error("Cache entry {0} not found in the local store")]
    EntryNotFound(String),

    #[error("Manifest mismatch for cache entry {entry}: {detail}")]
    ManifestMismatch { entry: String, detail: String },

    #[error("Tree hash mismatch for cache entry {entry}: expected {expected}, found {actual}\n{diff}")]
    TreeMismatch {
        entry: String,
        expected: String,
        actual: String,
        diff: String,
    },

    #[error("Verification failed at commit {revision}: {source}")]
    VerificationFailed {
        revision: String,
        #[source]
        source: Box<DepcacheError>,
    },

    #[error("Invalid object id: {0}")]
    InvalidId(String),

    // External process errors
    #[error("{program} exited with code {code}\n{output}")]
    ExternalProcess {
        program: String,
        code: i32,
        output: String,
    },

    #[error("Container runtime not found: {0}")]
    RuntimeNotFound(String),

    #[error("Interrupted while running {0}")]
    Interrupted(String),

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path: {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DepcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Innermost error, looking through verification context
    pub fn root(&self) -> &DepcacheError {
        match self {
            Self::VerificationFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the error reports a manifest/tree consistency failure
    pub fn is_consistency_failure(&self) -> bool {
        matches!(
            self.root(),
            Self::ManifestMismatch { .. } | Self::TreeMismatch { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::RemoteMissing { .. } | Self::EntryNotFound(_) => {
                Some("Run: depcache install && depcache push")
            }
            Self::ManifestMismatch { .. } => {
                Some("The manifest changed since the cache entry was built. Run: depcache install")
            }
            Self::TreeMismatch { .. } => Some(
                "The cached tree differs from a fresh hermetic install. \
                 Rebuild with: depcache install && depcache push",
            ),
            Self::RemoteNotConfigured => {
                Some("Set store.remote in .depcache.toml or export DEPCACHE_REMOTE")
            }
            Self::NoPointer(_) => Some("Run: depcache install"),
            Self::RuntimeNotFound(_) => {
                Some("Install podman, or set installer.runtime = \"docker\" in .depcache.toml")
            }
            Self::NotAGitRepository(_) => Some("Run depcache from inside the project checkout"),
            Self::Usage(_) => Some("Run: depcache --help"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DepcacheError::RemoteMissing {
            id: "abc".to_string(),
            remote: "origin".to_string(),
        };
        assert!(err.to_string().contains("not found in remote origin"));
    }

    #[test]
    fn entry_not_found_names_entry() {
        let err = DepcacheError::EntryNotFound("0123abcd".to_string());
        assert_eq!(
            err.to_string(),
            "Cache entry 0123abcd not found in the local store"
        );
    }

    #[test]
    fn error_hint() {
        let err = DepcacheError::ManifestMismatch {
            entry: "abc".to_string(),
            detail: "differs".to_string(),
        };
        assert!(err.hint().unwrap().contains("depcache install"));
        assert_eq!(DepcacheError::Internal("x".to_string()).hint(), None);
    }

    #[test]
    fn verification_context_keeps_root_hint() {
        let err = DepcacheError::VerificationFailed {
            revision: "c2".to_string(),
            source: Box::new(DepcacheError::ManifestMismatch {
                entry: "abc".to_string(),
                detail: "differs".to_string(),
            }),
        };
        assert!(err.is_consistency_failure());
        assert!(err.to_string().contains("commit c2"));
        assert!(err.hint().is_some());
    }
}
