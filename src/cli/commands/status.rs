//! Status command - show the cache state of the project

use crate::cli::commands::CommandContext;
use crate::error::DepcacheResult;
use crate::ui;

/// Execute the status command
pub async fn execute(ctx: &CommandContext) -> DepcacheResult<()> {
    let report = ctx.lifecycle().status().await?;
    let layout = &ctx.config.project;

    ui::section(&ctx.ui, "depcache status");
    ui::key_value(&ctx.ui, "project", &ctx.project_root().display().to_string());

    match report.manifest_key {
        Some(ref key) => ui::key_value(&ctx.ui, &layout.manifest, &key[..12]),
        None => ui::key_value_status(&ctx.ui, &layout.manifest, "missing", false),
    }

    match report.pointer {
        Some(ref id) => ui::key_value(&ctx.ui, "pointer", id.as_str()),
        None => ui::key_value_status(&ctx.ui, "pointer", "none", false),
    }

    match report.checkout {
        Some(ref marker) => {
            let current = report.pointer.as_ref() == Some(&marker.entry);
            let value = format!(
                "{} (checked out {})",
                marker.entry.short(),
                marker.checked_out_at.format("%Y-%m-%d %H:%M")
            );
            ui::key_value_status(&ctx.ui, &layout.checkout_dir, &value, current);
        }
        None => ui::key_value_status(&ctx.ui, &layout.checkout_dir, "absent", false),
    }

    match report.staged {
        Some(ref staged) => ui::key_value_status(
            &ctx.ui,
            "staged",
            &format!("{} (not pushed)", staged.tag),
            false,
        ),
        None => ui::key_value(&ctx.ui, "staged", "none"),
    }

    ui::key_value(
        &ctx.ui,
        "remote",
        report.remote.as_deref().unwrap_or("(not configured)"),
    );
    Ok(())
}
