//! Remove command - delete the working checkout

use crate::cli::commands::CommandContext;
use crate::error::DepcacheResult;
use crate::ui;

/// Execute the remove command
pub async fn execute(ctx: &CommandContext) -> DepcacheResult<()> {
    let lifecycle = ctx.lifecycle();
    let state = lifecycle.state().await?;
    lifecycle.remove(state).await?;

    ui::step_ok(
        &ctx.ui,
        &format!("Removed {}", ctx.config.project.checkout_dir),
    );
    Ok(())
}
