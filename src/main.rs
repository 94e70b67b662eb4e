//! depcache - verifiable dependency tree cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use depcache::cli::commands::{self, CommandContext};
use depcache::cli::{Cli, Commands};
use depcache::config::{Config, ConfigManager};
use depcache::error::{DepcacheError, DepcacheResult};
use depcache::exec::TRACE_TARGET;
use depcache::ui::UiContext;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            e.print().ok();
            return code;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> DepcacheResult<()> {
    let project_dir = match cli.project {
        Some(ref dir) if !dir.is_dir() => {
            return Err(DepcacheError::Usage(format!(
                "--project {} is not a directory",
                dir.display()
            )))
        }
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir()
            .map_err(|e| DepcacheError::io("getting current directory", e))?,
    };

    // Load configuration
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let local_config_path = ConfigManager::find_local_config(&project_dir);
    let mut config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    if let Some(remote) = cli.remote {
        config.store.remote = Some(remote);
    }
    let trace = cli.trace || config.general.trace;

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let level = match cli.verbose {
        0 => "depcache=warn",
        1 => "depcache=info",
        _ => "depcache=debug",
    };
    let filter = if trace {
        EnvFilter::new(format!("{level},{TRACE_TARGET}=debug"))
    } else {
        EnvFilter::new(level)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    debug!("Global config: {}", config_manager.path().display());
    if let Some(ref path) = local_config_path {
        debug!("Local config: {}", path.display());
    }

    let ui = UiContext::detect();

    let project_dir = project_dir.as_path();
    let open = move |config: Config, ui: UiContext| CommandContext::open(config, project_dir, ui);

    // Dispatch to command
    match cli.command {
        // Works without a git repository when the lock file is current
        Commands::MakePackageLock => commands::make_package_lock(config, project_dir, ui).await,
        Commands::Remove => commands::remove(&open(config, ui).await?).await,
        Commands::Checkout(args) => commands::checkout(args, &open(config, ui).await?).await,
        Commands::Install => commands::install(&open(config, ui).await?).await,
        Commands::Push => commands::push(&open(config, ui).await?).await,
        Commands::TreeHash(args) => commands::tree_hash(args, &open(config, ui).await?).await,
        Commands::Verify(args) => commands::verify(args, &open(config, ui).await?).await,
        Commands::Status => commands::status(&open(config, ui).await?).await,
    }
}
