//! Search-path hints left behind by steps
//!
//! A step may write `paths.txt` into its output directory, one path per
//! line. The hints are not persisted by the host across restores, so they
//! are forwarded on every run, hit or miss.

use crate::error::{StepCacheError, StepCacheResult};
use crate::host::HostEnvironment;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::info;

/// Manifest file name inside a step directory
pub const PATH_MANIFEST: &str = "paths.txt";

/// Parse manifest content into the paths to add, in file order
fn manifest_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
}

/// Forward every path listed in `step_dir/paths.txt` to the host
///
/// Each line is appended, so earlier entries keep precedence. A missing
/// manifest means the step declares no paths, and bytes that are not valid
/// UTF-8 are replaced rather than rejected. Returns the forwarded paths.
pub async fn propagate(step_dir: &Path, host: &dyn HostEnvironment) -> StepCacheResult<Vec<String>> {
    let manifest = step_dir.join(PATH_MANIFEST);
    let content = match fs::read(&manifest).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(StepCacheError::io(
                format!("reading {}", manifest.display()),
                e,
            ))
        }
    };

    let mut added = Vec::new();
    for line in manifest_lines(&content) {
        info!("Add path {}.", line);
        host.add_path(line).await?;
        added.push(line.to_string());
    }
    Ok(added)
}
