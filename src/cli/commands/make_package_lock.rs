//! make_package_lock command - build-system entry point
//!
//! Brings the checkout in line with the project pointer and refreshes the
//! lock file from the checked-out entry.

use crate::cache::LockSync;
use crate::cli::commands::CommandContext;
use crate::config::schema::ProjectConfig;
use crate::config::Config;
use crate::error::{DepcacheError, DepcacheResult};
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Execute the make_package_lock command
pub async fn execute(config: Config, project_dir: &Path, ui_ctx: UiContext) -> DepcacheResult<()> {
    let layout = config.project.clone();
    let ctx = match CommandContext::open(config, project_dir, ui_ctx.clone()).await {
        Ok(ctx) => ctx,
        // Source archives without git history still build if the lock is current
        Err(DepcacheError::NotAGitRepository(path)) => {
            if lock_is_current(&layout, project_dir).await? {
                ui::step_info(
                    &ui_ctx,
                    &format!("No git repository; {} is up to date", layout.lockfile),
                );
                return Ok(());
            }
            return Err(DepcacheError::NotAGitRepository(path));
        }
        Err(e) => return Err(e),
    };

    let lifecycle = ctx.lifecycle();
    let state = lifecycle.state().await?;
    let result = lifecycle.ensure_fresh(state).await;
    ctx.progress().finish();
    let (state, sync) = result?;

    let entry = state.entry().map(|id| id.short().to_string()).unwrap_or_default();
    match sync {
        LockSync::Updated => {
            ui::step_ok_detail(&ctx.ui, &format!("Updated {}", layout.lockfile), &entry)
        }
        LockSync::Unchanged => {
            ui::step_ok_detail(&ctx.ui, &format!("{} up to date", layout.lockfile), &entry)
        }
        LockSync::NotProvided => ui::step_warn_hint(
            &ctx.ui,
            &format!("Entry {} carries no lock file", entry),
            &format!("{} left untouched", layout.lockfile),
        ),
    }
    Ok(())
}

/// Whether the lock file exists and is at least as new as the manifest
async fn lock_is_current(layout: &ProjectConfig, project_dir: &Path) -> DepcacheResult<bool> {
    let manifest = project_dir.join(&layout.manifest);
    let lockfile = project_dir.join(&layout.lockfile);

    let (Ok(manifest_meta), Ok(lock_meta)) =
        (fs::metadata(&manifest).await, fs::metadata(&lockfile).await)
    else {
        debug!("{} or {} missing", manifest.display(), lockfile.display());
        return Ok(false);
    };

    let modified = |meta: std::fs::Metadata, path: &Path| {
        meta.modified()
            .map_err(|e| DepcacheError::io(format!("reading mtime of {}", path.display()), e))
    };
    Ok(modified(lock_meta, &lockfile)? >= modified(manifest_meta, &manifest)?)
}
