//! Install command - build a new cache entry

use crate::cli::commands::CommandContext;
use crate::error::DepcacheResult;
use crate::ui;

/// Execute the install command
pub async fn execute(ctx: &CommandContext) -> DepcacheResult<()> {
    let lifecycle = ctx.lifecycle();
    let state = lifecycle.state().await?;

    ui::step_info(
        &ctx.ui,
        &format!(
            "Installing {} in {}",
            ctx.config.project.manifest, ctx.config.installer.image
        ),
    );

    let result = lifecycle.install(state).await;
    ctx.progress().finish();
    let state = result?;

    if let Some(id) = state.entry() {
        ui::step_ok_detail(&ctx.ui, &format!("Created entry {}", id.short()), &id.tag());
        ui::remark(&ctx.ui, "Pointer staged. Publish with: depcache push");
    }
    Ok(())
}
