//! Terminal output for depcache commands
//!
//! Uses `cliclack` log lines and spinners in an interactive terminal, with
//! automatic fallback to plain output in CI and when output is piped.
//!
//! # Example
//!
//! ```rust,ignore
//! use depcache::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Fetching cache entry...");
//! // ... do work ...
//! spinner.stop("Entry available locally");
//!
//! ui::step_ok(&ctx, "Checked out 0123456789ab");
//! ui::step_warn_hint(&ctx, "Nothing staged", "Run: depcache install");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    key_value, key_value_status, remark, section, step_info, step_ok, step_ok_detail,
    step_warn_hint,
};
pub use progress::{InstallProgress, TaskSpinner};
