//! Tree hash command - expected hash of the manifest at a commit

use crate::cli::args::TreeHashArgs;
use crate::cli::commands::CommandContext;
use crate::error::DepcacheResult;

/// Execute the tree_hash command
///
/// Only the hash goes to stdout so scripts can capture it.
pub async fn execute(args: TreeHashArgs, ctx: &CommandContext) -> DepcacheResult<()> {
    let result = ctx.verification_job().tree_hash_at(&args.commit).await;
    ctx.progress().finish();

    println!("{}", result?.tree_hash);
    Ok(())
}
