//! Steps command - show a runner's cacheable steps

use crate::cache::{CacheKey, StepName};
use crate::cli::args::{OutputFormat, StepsArgs};
use crate::config::Config;
use crate::error::StepCacheResult;
use crate::runner::StepRunner;
use console::style;
use serde::Serialize;

#[derive(Serialize)]
struct StepJson {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<CacheKey>,
}

/// Execute the steps command
pub async fn execute(args: StepsArgs, config: &Config) -> StepCacheResult<()> {
    let runner = args.helper.runner(&config.helper);
    let steps = runner.list_steps(&args.runner_name).await?;
    let suffix = args.cache_version_suffix.as_deref().filter(|s| !s.is_empty());

    match args.format {
        OutputFormat::Table => print_table(&args.runner_name, &steps, suffix),
        OutputFormat::Json => print_json(&steps, suffix)?,
        OutputFormat::Plain => print_plain(&steps),
    }

    Ok(())
}

fn print_table(runner: &str, steps: &[StepName], suffix: Option<&str>) {
    if steps.is_empty() {
        println!("Runner {} has no cacheable steps.", runner);
        return;
    }

    println!("{:<40} {:<50}", style("STEP").bold(), style("CACHE KEY").bold());
    println!("{}", "-".repeat(90));

    for step in steps {
        let key = match suffix {
            Some(suffix) => CacheKey::for_step(step.as_str(), suffix).to_string(),
            None => style("-").dim().to_string(),
        };
        println!("{:<40} {:<50}", step, key);
    }

    println!();
    println!("{} step(s)", steps.len());
}

fn print_json(steps: &[StepName], suffix: Option<&str>) -> StepCacheResult<()> {
    let json: Vec<StepJson> = steps
        .iter()
        .map(|step| StepJson {
            name: step.to_string(),
            key: suffix.map(|s| CacheKey::for_step(step.as_str(), s)),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_plain(steps: &[StepName]) {
    for step in steps {
        println!("{}", step);
    }
}
