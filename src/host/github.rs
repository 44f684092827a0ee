//! GitHub Actions host
//!
//! Uses the environment files (`GITHUB_PATH`, `GITHUB_OUTPUT`) when the
//! runner provides them and falls back to workflow commands on stdout.

use crate::error::{StepCacheError, StepCacheResult};
use crate::host::HostEnvironment;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Host primitives for GitHub Actions runners
#[derive(Debug, Clone, Default)]
pub struct GithubActions {
    path_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

impl GithubActions {
    /// Read the environment file locations from the process environment
    pub fn from_env() -> Self {
        Self {
            path_file: env_path("GITHUB_PATH"),
            output_file: env_path("GITHUB_OUTPUT"),
        }
    }

    /// Use explicit environment files
    pub fn with_files(path_file: Option<PathBuf>, output_file: Option<PathBuf>) -> Self {
        Self {
            path_file,
            output_file,
        }
    }

    async fn append(file: &Path, content: &str) -> StepCacheResult<()> {
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .await
            .map_err(|e| StepCacheError::io(format!("opening {}", file.display()), e))?;

        handle
            .write_all(content.as_bytes())
            .await
            .map_err(|e| StepCacheError::io(format!("writing {}", file.display()), e))?;
        handle
            .flush()
            .await
            .map_err(|e| StepCacheError::io(format!("writing {}", file.display()), e))
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Escape a workflow command message
fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escape a workflow command property
fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

/// Format an entry for the `GITHUB_OUTPUT` file
fn output_entry(name: &str, value: &str) -> String {
    if value.contains('\n') || value.contains('\r') {
        let delimiter = format!("ghadelimiter_{}", Uuid::new_v4());
        format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
    } else {
        format!("{name}={value}\n")
    }
}

#[async_trait]
impl HostEnvironment for GithubActions {
    async fn add_path(&self, path: &str) -> StepCacheResult<()> {
        match &self.path_file {
            Some(file) => Self::append(file, &format!("{}\n", path)).await,
            None => {
                println!("::add-path::{}", escape_data(path));
                Ok(())
            }
        }
    }

    async fn set_output(&self, name: &str, value: &str) -> StepCacheResult<()> {
        match &self.output_file {
            Some(file) => Self::append(file, &output_entry(name, value)).await,
            None => {
                println!(
                    "::set-output name={}::{}",
                    escape_property(name),
                    escape_data(value)
                );
                Ok(())
            }
        }
    }

    fn set_failed(&self, message: &str) {
        println!("::error::{}", escape_data(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn escape_workflow_message() {
        assert_eq!(escape_data("50% done\nnext"), "50%25 done%0Anext");
        assert_eq!(escape_property("a:b,c"), "a%3Ab%2Cc");
    }

    #[test]
    fn output_entry_single_and_multiline() {
        assert_eq!(output_entry("cache-hits", "a,b"), "cache-hits=a,b\n");

        let entry = output_entry("log", "one\ntwo");
        let mut lines = entry.lines();
        let header = lines.next().unwrap();
        let delimiter = header.strip_prefix("log<<").unwrap();
        assert_eq!(lines.next(), Some("one"));
        assert_eq!(lines.next(), Some("two"));
        assert_eq!(lines.next(), Some(delimiter));
    }

    #[tokio::test]
    async fn add_path_appends_lines_in_order() {
        let temp = TempDir::new().unwrap();
        let path_file = temp.path().join("github_path");
        let host = GithubActions::with_files(Some(path_file.clone()), None);

        host.add_path("/opt/a/bin").await.unwrap();
        host.add_path("/opt/b/bin").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(path_file).unwrap(),
            "/opt/a/bin\n/opt/b/bin\n"
        );
    }

    #[tokio::test]
    async fn set_output_appends_to_output_file() {
        let temp = TempDir::new().unwrap();
        let output_file = temp.path().join("github_output");
        let host = GithubActions::with_files(None, Some(output_file.clone()));

        host.set_output("cache-saved", "b").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(output_file).unwrap(),
            "cache-saved=b\n"
        );
    }

    #[test]
    #[serial]
    fn from_env_ignores_empty_values() {
        std::env::set_var("GITHUB_PATH", "/tmp/github_path");
        std::env::set_var("GITHUB_OUTPUT", "");

        let host = GithubActions::from_env();

        assert_eq!(host.path_file, Some(PathBuf::from("/tmp/github_path")));
        assert_eq!(host.output_file, None);

        std::env::remove_var("GITHUB_PATH");
        std::env::remove_var("GITHUB_OUTPUT");
    }
}
