//! CLI argument definitions using clap derive

use crate::config::schema::HelperConfig;
use crate::runner::HelperRunner;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// stepcache - per-step result caching for CI runners
///
/// Restores cached step outputs, runs the step runner, and saves the
/// outputs that were not cached yet.
#[derive(Parser, Debug)]
#[command(name = "stepcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STEPCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .stepcache.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore step caches, execute the runner, save new step outputs
    Run(RunArgs),

    /// List the cacheable steps of a runner and their cache keys
    Steps(StepsArgs),

    /// Inspect or clear the local cache store
    Cache(CacheArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Overrides for the step runner helper command
#[derive(Parser, Debug, Default)]
pub struct HelperArgs {
    /// Helper program (overrides [helper] program)
    #[arg(long, env = "STEPCACHE_HELPER")]
    pub helper: Option<String>,

    /// Argument passed to the helper before the runner name (repeatable)
    #[arg(long = "helper-arg", allow_hyphen_values = true, requires = "helper")]
    pub helper_args: Vec<String>,
}

impl HelperArgs {
    /// Build the helper runner, preferring CLI overrides over config
    pub fn runner(&self, config: &HelperConfig) -> HelperRunner {
        match &self.helper {
            Some(program) => HelperRunner::new(program.clone(), self.helper_args.clone()),
            None => HelperRunner::from_config(config),
        }
    }
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Runner whose steps are cached
    #[arg(long, env = "INPUT_RUNNER-NAME")]
    pub runner_name: Option<String>,

    /// Suffix appended to every cache key; change it to invalidate all caches
    #[arg(long, env = "INPUT_CACHE-VERSION-SUFFIX")]
    pub cache_version_suffix: Option<String>,

    /// Directory holding one sub-directory per step (created if missing)
    #[arg(long, env = "INPUT_CACHE-DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(flatten)]
    pub helper: HelperArgs,

    /// Cache store directory (overrides [cache] store_dir)
    #[arg(long, env = "STEPCACHE_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Concurrent restore/save calls (overrides [cache] concurrency)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Write a JSON run report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Arguments for the steps command
#[derive(Parser, Debug)]
pub struct StepsArgs {
    /// Runner to enumerate
    #[arg(env = "INPUT_RUNNER-NAME")]
    pub runner_name: String,

    /// Suffix used to display cache keys
    #[arg(long, env = "INPUT_CACHE-VERSION-SUFFIX")]
    pub cache_version_suffix: Option<String>,

    #[command(flatten)]
    pub helper: HelperArgs,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show configuration file path
    Path,
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Cache store directory (overrides [cache] store_dir)
    #[arg(long, global = true, env = "STEPCACHE_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List all cache entries
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove a single entry by key
    Remove {
        /// Cache key (e.g. build_image-v3)
        key: String,
    },

    /// Remove every entry in the store
    Clear {
        /// Confirm removal
        #[arg(short, long)]
        yes: bool,
    },
}
