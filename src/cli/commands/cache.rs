//! Cache command - inspect and clear the local cache store

use crate::cache::{format_bytes, CacheEntry, CacheKey, LocalCacheBackend};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::{StepCacheError, StepCacheResult};
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> StepCacheResult<()> {
    let store_dir = args
        .store_dir
        .unwrap_or_else(|| config.cache.effective_store_dir());
    let backend = LocalCacheBackend::new(store_dir);

    match args.action {
        CacheAction::List { format } => list_entries(&backend, format).await,
        CacheAction::Remove { key } => remove_entry(&backend, &key).await,
        CacheAction::Clear { yes } => clear_entries(&backend, yes).await,
    }
}

async fn list_entries(backend: &LocalCacheBackend, format: OutputFormat) -> StepCacheResult<()> {
    let entries = backend.list().await?;

    if entries.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => println!("No cache entries in {}", backend.store_dir().display()),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(&entries),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.key);
            }
        }
    }

    Ok(())
}

fn print_table(entries: &[CacheEntry]) {
    println!(
        "{:<50} {:<8} {:<10} {:<20}",
        style("KEY").bold(),
        style("FILES").bold(),
        style("SIZE").bold(),
        style("CREATED").bold()
    );
    println!("{}", "-".repeat(90));

    let mut total = 0;
    for entry in entries {
        total += entry.size_bytes;
        println!(
            "{:<50} {:<8} {:<10} {:<20}",
            entry.key,
            entry.files,
            format_bytes(entry.size_bytes),
            entry.created_at.format("%Y-%m-%d %H:%M").to_string()
        );
    }

    println!();
    println!("Total: {} entr(ies), {}", entries.len(), format_bytes(total));
}

async fn remove_entry(backend: &LocalCacheBackend, key: &str) -> StepCacheResult<()> {
    backend.remove(&CacheKey::from_raw(key)).await?;
    println!("{} Removed {}", style("✓").green(), key);
    Ok(())
}

async fn clear_entries(backend: &LocalCacheBackend, yes: bool) -> StepCacheResult<()> {
    if !yes {
        return Err(StepCacheError::User(format!(
            "Refusing to clear {} without --yes",
            backend.store_dir().display()
        )));
    }

    let removed = backend.clear().await?;
    println!("{} Removed {} cache entr(ies)", style("✓").green(), removed);
    Ok(())
}
