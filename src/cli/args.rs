//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// depcache - verifiable cache of installed dependency trees
///
/// Keeps the dependency tree built from a manifest as an immutable entry in
/// a content-addressed store, shares it through a remote cache repository
/// and verifies that cached trees match a fresh hermetic install.
#[derive(Parser, Debug)]
#[command(name = "depcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Echo every external command that is run
    #[arg(long, global = true, env = "DEPCACHE_TRACE")]
    pub trace: bool,

    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DEPCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Remote cache repository (overrides store.remote)
    #[arg(long, global = true, env = "DEPCACHE_REMOTE")]
    pub remote: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Delete the working checkout
    Remove,

    /// Check out a cache entry (defaults to the project pointer)
    Checkout(CheckoutArgs),

    /// Build a new cache entry from the local manifest
    Install,

    /// Publish the entry produced by the last install
    Push,

    /// Print the expected tree hash of the manifest at a commit
    #[command(name = "tree_hash", alias = "tree-hash")]
    TreeHash(TreeHashArgs),

    /// Refresh the checkout and lock file for a build
    #[command(name = "make_package_lock", alias = "make-package-lock")]
    MakePackageLock,

    /// Verify the cache entries a commit range points at
    Verify(VerifyArgs),

    /// Show manifest, pointer, checkout and staged entry
    Status,
}

/// Arguments for the checkout command
#[derive(Parser, Debug)]
pub struct CheckoutArgs {
    /// Entry id to check out
    pub entry: Option<String>,

    /// Skip verification against the local manifest
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the tree_hash command
#[derive(Parser, Debug)]
pub struct TreeHashArgs {
    /// Project commit whose manifest is fingerprinted
    pub commit: String,
}

/// Arguments for the verify command
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Commit the range starts after
    pub base: String,

    /// Last commit of the range
    #[arg(default_value = "HEAD")]
    pub head: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_remove() {
        let cli = Cli::parse_from(["depcache", "remove"]);
        assert!(matches!(cli.command, Commands::Remove));
    }

    #[test]
    fn cli_parses_checkout_defaults() {
        let cli = Cli::parse_from(["depcache", "checkout"]);
        match cli.command {
            Commands::Checkout(args) => {
                assert!(args.entry.is_none());
                assert!(!args.force);
            }
            _ => panic!("expected Checkout command"),
        }
    }

    #[test]
    fn cli_parses_checkout_force() {
        let cli = Cli::parse_from(["depcache", "checkout", "0123abcd", "--force"]);
        match cli.command {
            Commands::Checkout(args) => {
                assert_eq!(args.entry.as_deref(), Some("0123abcd"));
                assert!(args.force);
            }
            _ => panic!("expected Checkout command"),
        }
    }

    #[test]
    fn cli_parses_underscore_verbs() {
        let cli = Cli::parse_from(["depcache", "tree_hash", "HEAD~1"]);
        match cli.command {
            Commands::TreeHash(args) => assert_eq!(args.commit, "HEAD~1"),
            _ => panic!("expected TreeHash command"),
        }

        let cli = Cli::parse_from(["depcache", "make_package_lock"]);
        assert!(matches!(cli.command, Commands::MakePackageLock));

        let cli = Cli::parse_from(["depcache", "make-package-lock"]);
        assert!(matches!(cli.command, Commands::MakePackageLock));
    }

    #[test]
    fn cli_parses_verify_default_head() {
        let cli = Cli::parse_from(["depcache", "verify", "origin/main"]);
        match cli.command {
            Commands::Verify(args) => {
                assert_eq!(args.base, "origin/main");
                assert_eq!(args.head, "HEAD");
            }
            _ => panic!("expected Verify command"),
        }
    }

    #[test]
    fn cli_global_flags() {
        let cli = Cli::parse_from([
            "depcache",
            "status",
            "--project",
            "/work/app",
            "--remote",
            "git@example.com:cache.git",
        ]);
        assert_eq!(cli.project, Some(PathBuf::from("/work/app")));
        assert_eq!(cli.remote.as_deref(), Some("git@example.com:cache.git"));
    }

    #[test]
    fn cli_rejects_unknown_verb() {
        assert!(Cli::try_parse_from(["depcache", "frobnicate"]).is_err());
        assert!(Cli::try_parse_from(["depcache"]).is_err());
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["depcache", "status"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["depcache", "-v", "status"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["depcache", "-vv", "status"]);
        assert_eq!(cli.verbose, 2);
    }
}
