//! Subprocess-backed step runner
//!
//! Speaks the helper protocol:
//!
//! - `<program> <args..> <runner> get-steps-ids` prints a JSON array of step
//!   names on stdout and exits 0.
//! - `<program> <args..> <runner> execute --build-root-dir <cache dir>` runs
//!   the steps with the job console attached and exits 0 on success.

use crate::cache::StepName;
use crate::config::schema::HelperConfig;
use crate::error::{StepCacheError, StepCacheResult};
use crate::runner::client::StepRunner;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Max number of stderr lines carried into enumeration errors.
const ERROR_TAIL_LINES: usize = 20;

/// Runs the helper program as a subprocess
#[derive(Debug, Clone)]
pub struct HelperRunner {
    program: String,
    args: Vec<String>,
}

impl HelperRunner {
    /// Create a runner invoking `program` with the fixed leading `args`
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Create a runner from the `[helper]` config section
    pub fn from_config(config: &HelperConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    fn command_line(&self, trailing: &[&str]) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .chain(trailing.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Keep the last `ERROR_TAIL_LINES` lines of process output
fn output_tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Parse the JSON array printed by `get-steps-ids`
fn parse_step_ids(command: &str, stdout: &[u8]) -> StepCacheResult<Vec<StepName>> {
    let ids: Vec<String> = serde_json::from_slice(stdout).map_err(|e| {
        StepCacheError::enumeration(command, format!("output is not a JSON array of strings: {}", e))
    })?;

    ids.into_iter()
        .map(|id| StepName::new(id).map_err(|e| StepCacheError::enumeration(command, e.to_string())))
        .collect()
}

#[async_trait]
impl StepRunner for HelperRunner {
    async fn list_steps(&self, runner: &str) -> StepCacheResult<Vec<StepName>> {
        let command_line = self.command_line(&[runner, "get-steps-ids"]);
        debug!("Executing: {}", command_line);

        let output = self
            .command()
            .args([runner, "get-steps-ids"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| StepCacheError::command_failed(&command_line, e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("{} stderr:\n{}", command_line, stderr.trim_end());
        }

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            };
            let tail = output_tail(&stderr);
            let reason = if tail.is_empty() {
                status
            } else {
                format!("{}\n{}", status, tail)
            };
            return Err(StepCacheError::enumeration(command_line, reason));
        }

        parse_step_ids(&command_line, &output.stdout)
    }

    async fn execute(&self, runner: &str, cache_dir: &Path) -> StepCacheResult<()> {
        let cache_dir_arg = cache_dir.display().to_string();
        let command_line =
            self.command_line(&[runner, "execute", "--build-root-dir", &cache_dir_arg]);
        debug!("Executing interactively: {}", command_line);

        let status = self
            .command()
            .args([runner, "execute", "--build-root-dir"])
            .arg(cache_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| StepCacheError::command_failed(&command_line, e))?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(StepCacheError::Execution {
                command: command_line,
                code,
            }),
            None => Err(StepCacheError::ProcessSignaled(command_line)),
        }
    }

    fn describe(&self) -> String {
        self.command_line(&[])
    }
}
