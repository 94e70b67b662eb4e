//! Checkout command - materialize a cache entry

use crate::cache::Verification;
use crate::cli::args::CheckoutArgs;
use crate::cli::commands::CommandContext;
use crate::error::DepcacheResult;
use crate::store::EntryId;
use crate::ui;

/// Execute the checkout command
pub async fn execute(args: CheckoutArgs, ctx: &CommandContext) -> DepcacheResult<()> {
    let target = args.entry.as_deref().map(EntryId::parse).transpose()?;
    let verification = if args.force {
        Verification::Skip
    } else {
        Verification::Full
    };

    let lifecycle = ctx.lifecycle();
    let state = lifecycle.state().await?;

    match target {
        Some(ref id) => ui::step_info(&ctx.ui, &format!("Checking out {}", id.short())),
        None => ui::step_info(&ctx.ui, "Checking out the project pointer"),
    }
    if verification == Verification::Full {
        ui::remark(&ctx.ui, "Verifying against a fresh install of the local manifest");
    }

    let result = lifecycle.checkout(state, target, verification).await;
    ctx.progress().finish();
    let state = result?;

    if let Some(id) = state.entry() {
        ui::step_ok_detail(
            &ctx.ui,
            &format!("Checked out {}", id.short()),
            &lifecycle.checkout_dir().display().to_string(),
        );
    }
    Ok(())
}
