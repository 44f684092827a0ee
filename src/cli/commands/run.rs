//! Run command - restore, execute, save

use crate::cache::{CacheBackend, LocalCacheBackend};
use crate::cli::args::RunArgs;
use crate::config::Config;
use crate::error::{StepCacheError, StepCacheResult};
use crate::host::{GithubActions, HostEnvironment};
use crate::reconcile::{Reconciler, RunInputs, RunReport};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config) -> StepCacheResult<()> {
    let inputs = resolve_inputs(&args)?;

    let store_dir = args
        .store_dir
        .clone()
        .unwrap_or_else(|| config.cache.effective_store_dir());
    let backend = Arc::new(LocalCacheBackend::new(store_dir));
    info!(
        "Using {} cache store at {}",
        backend.backend_name(),
        backend.store_dir().display()
    );

    let runner = Arc::new(args.helper.runner(&config.helper));
    let host = Arc::new(GithubActions::from_env());
    let concurrency = args
        .concurrency
        .unwrap_or_else(|| config.cache.effective_concurrency());

    let reconciler =
        Reconciler::new(backend, runner, host.clone()).with_concurrency(concurrency);
    let report = reconciler.run(&inputs).await?;

    host.set_output("cache-hits", &report.hits().join(",")).await?;
    host.set_output("cache-saved", &report.saved().join(",")).await?;

    if let Some(ref path) = args.report {
        write_report(&report, path).await?;
    }

    print_summary(&report);
    Ok(())
}

/// Validate the three required inputs
///
/// Empty values count as missing, since the host sets unset inputs to "".
fn resolve_inputs(args: &RunArgs) -> StepCacheResult<RunInputs> {
    let runner_name = required(args.runner_name.as_deref(), "runner-name")?;
    let version_suffix = required(args.cache_version_suffix.as_deref(), "cache-version-suffix")?;
    let cache_dir = args
        .cache_dir
        .clone()
        .filter(|dir| !dir.as_os_str().is_empty())
        .ok_or(StepCacheError::MissingInput("cache-dir"))?;

    Ok(RunInputs {
        runner_name,
        version_suffix,
        cache_dir,
    })
}

fn required(value: Option<&str>, name: &'static str) -> StepCacheResult<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(StepCacheError::MissingInput(name))
}

async fn write_report(report: &RunReport, path: &Path) -> StepCacheResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)
        .await
        .map_err(|e| StepCacheError::io(format!("writing report to {}", path.display()), e))?;
    info!("Run report written to {}", path.display());
    Ok(())
}

fn print_summary(report: &RunReport) {
    let failures = report.save_failures();
    if !failures.is_empty() {
        warn!("{} step cache(s) could not be saved", failures.len());
    }

    let missing = report.missing();
    if !missing.is_empty() {
        warn!(
            "Enumerated step(s) left no output directory: {}",
            missing.join(", ")
        );
    }

    println!(
        "{} Runner {}: {} hit, {} saved, {} save failed",
        style("✓").green(),
        style(&report.runner).cyan(),
        report.hits().len(),
        report.saved().len(),
        failures.len()
    );
}
