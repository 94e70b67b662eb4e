//! Access to the enclosing project's version control
//!
//! The project records which cache entry it expects as a gitlink (mode
//! `160000`) entry for the checkout directory. Verification walks the
//! project's history and reads manifests and pointers at past commits.

mod git;

pub use git::GitProject;

use crate::error::DepcacheResult;
use crate::store::EntryId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Git file mode of a gitlink entry
pub const GITLINK_MODE: &str = "160000";

/// Abstract project repository
#[async_trait]
pub trait ProjectRepo: Send + Sync {
    /// Project root directory
    fn root(&self) -> &Path;

    /// Pointer currently recorded in the index for `checkout_dir`
    async fn pointer(&self, checkout_dir: &str) -> DepcacheResult<Option<EntryId>>;

    /// Stage `id` as the pointer for `checkout_dir`
    async fn stage_pointer(&self, checkout_dir: &str, id: &EntryId) -> DepcacheResult<()>;

    /// Commits in `base..head` touching any of `paths`, oldest first
    async fn history(&self, base: &str, head: &str, paths: &[&str])
        -> DepcacheResult<Vec<String>>;

    /// Contents of `path` at `revision`
    async fn file_at(&self, revision: &str, path: &str) -> DepcacheResult<Option<Vec<u8>>>;

    /// Pointer recorded for `checkout_dir` at `revision`
    async fn pointer_at(&self, revision: &str, checkout_dir: &str)
        -> DepcacheResult<Option<EntryId>>;

    /// Leftovers of other checkout mechanisms (e.g. submodule git dirs)
    fn lingering_paths(&self, _checkout_dir: &str) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Parse a `<mode> [<type>] <sha>[ <stage>]\t<path>` line naming a gitlink
pub(crate) fn parse_gitlink(line: &str) -> Option<EntryId> {
    let (meta, _path) = line.split_once('\t')?;
    let mut fields = meta.split_whitespace();
    if fields.next()? != GITLINK_MODE {
        return None;
    }
    fields
        .find(|f| f.len() >= 40)
        .and_then(|sha| EntryId::parse(sha).ok())
}
