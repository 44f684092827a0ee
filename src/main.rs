//! stepcache - per-step result caching for CI runners
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use stepcache::cli::{Cli, Commands};
use stepcache::config::{Config, ConfigManager};
use stepcache::error::{StepCacheError, StepCacheResult};
use stepcache::host::{GithubActions, HostEnvironment};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if std::env::var("GITHUB_ACTIONS").as_deref() == Ok("true") {
                GithubActions::from_env().set_failed(&e.to_string());
            }
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> StepCacheResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| StepCacheError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config);
    if let Some(ref path) = local_config_path {
        debug!("Found local config: {}", path.display());
    }

    // Dispatch to command
    match cli.command {
        Commands::Run(args) => stepcache::cli::commands::run(args, &config).await,
        Commands::Steps(args) => stepcache::cli::commands::steps(args, &config).await,
        Commands::Cache(args) => stepcache::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            let source = local_config_path
                .as_deref()
                .unwrap_or(config_manager.path());
            stepcache::cli::commands::config(args, &config, source)
        }
    }
}

/// Initialize logging: 0 = info, 1 = debug, 2+ = trace; RUST_LOG wins when set
fn init_logging(verbose: u8, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("stepcache=info"),
        1 => EnvFilter::new("stepcache=debug"),
        _ => EnvFilter::new("stepcache=trace"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
