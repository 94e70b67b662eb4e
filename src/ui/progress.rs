//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::OnceLock;
use std::time::Duration;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            eprintln!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            eprintln!("{} {}", style("[FAIL]").red(), message);
        }
    }

    /// Clear the spinner without any message
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.clear();
        }
    }
}

/// Live view of installer output.
///
/// The bar appears with the first output line, so commands that never
/// reach the installer show nothing. In CI every line is echoed to stderr.
pub struct InstallProgress {
    label: String,
    interactive: bool,
    bar: OnceLock<ProgressBar>,
}

impl InstallProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        Self {
            label: label.to_string(),
            interactive: ctx.use_fancy_output(),
            bar: OnceLock::new(),
        }
    }

    /// Process one line of installer output
    pub fn on_line(&self, line: String) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        if !self.interactive {
            eprintln!("  {} {}", style("|").dim(), trimmed);
            return;
        }

        let bar = self.bar.get_or_init(|| self.start_bar());
        bar.inc(1);
        if !is_install_noise(trimmed) {
            bar.set_message(truncate(trimmed, 60));
        }
    }

    /// Number of output lines seen so far (interactive mode only)
    pub fn lines(&self) -> u64 {
        self.bar.get().map_or(0, ProgressBar::position)
    }

    /// Finish and clear the bar
    pub fn finish(&self) {
        if let Some(bar) = self.bar.get() {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }

    fn start_bar(&self) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {prefix}  {msg:.dim}  {elapsed:.dim}")
        {
            bar.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }
        bar.set_prefix(self.label.clone());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }
}

/// npm chatter that would only flicker past
fn is_install_noise(line: &str) -> bool {
    line.starts_with("npm notice")
        || line.starts_with("npm WARN deprecated")
        || line.starts_with("npm timing")
}

fn truncate(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let head: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}
