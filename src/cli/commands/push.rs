//! Push command - publish the staged entry

use crate::cache::PushOutcome;
use crate::cli::commands::CommandContext;
use crate::error::DepcacheResult;
use crate::ui::{self, TaskSpinner};

/// Execute the push command
pub async fn execute(ctx: &CommandContext) -> DepcacheResult<()> {
    let mut spinner = TaskSpinner::new(&ctx.ui);
    spinner.start("Publishing staged entry...");

    match ctx.lifecycle().push().await {
        Ok(PushOutcome::Pushed(id)) => {
            spinner.stop(&format!("Pushed {}", id.tag()));
        }
        Ok(PushOutcome::NothingStaged) => {
            spinner.clear();
            ui::step_warn_hint(
                &ctx.ui,
                "No installed entry is waiting to be pushed",
                "Run: depcache install",
            );
        }
        Err(e) => {
            spinner.stop_error("Push failed");
            return Err(e);
        }
    }
    Ok(())
}
