//! Config command - show configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::Config;
use crate::error::StepCacheResult;
use std::path::Path;

/// Execute the config command
///
/// `source` is the file the effective configuration was layered from.
pub fn execute(args: ConfigArgs, config: &Config, source: &Path) -> StepCacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => println!("{}", toml::to_string_pretty(config)?),
        Some(ConfigAction::Path) => println!("{}", source.display()),
    }
    Ok(())
}
