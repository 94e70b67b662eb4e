//! Verify command - check the entries a commit range points at

use crate::cli::args::VerifyArgs;
use crate::cli::commands::CommandContext;
use crate::error::DepcacheResult;
use crate::ui;

/// Execute the verify command
pub async fn execute(args: VerifyArgs, ctx: &CommandContext) -> DepcacheResult<()> {
    ui::section(&ctx.ui, &format!("Verifying {}..{}", args.base, args.head));

    let result = ctx.verification_job().run(&args.base, &args.head).await;
    ctx.progress().finish();
    let verified = result?;

    if verified.is_empty() {
        ui::step_info(
            &ctx.ui,
            &format!(
                "No commits touch {} or {}",
                ctx.config.project.manifest, ctx.config.project.checkout_dir
            ),
        );
        return Ok(());
    }

    for commit in &verified {
        let revision = &commit.revision[..12.min(commit.revision.len())];
        ui::step_ok_detail(&ctx.ui, revision, commit.entry.short());
    }
    ui::step_ok(&ctx.ui, &format!("{} commit(s) verified", verified.len()));
    Ok(())
}
