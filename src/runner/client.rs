//! Step runner abstraction

use crate::cache::StepName;
use crate::error::StepCacheResult;
use async_trait::async_trait;
use std::path::Path;

/// Interface to the external process that knows a runner's steps
///
/// Both calls are fatal on failure: the run can not proceed without the step
/// set, and a failed execution must not be followed by any cache save.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Ordered list of the cacheable steps used by `runner`
    async fn list_steps(&self, runner: &str) -> StepCacheResult<Vec<StepName>>;

    /// Execute every step of `runner`, writing outputs under `cache_dir/<step>/`
    ///
    /// Steps whose directory was restored are expected to be skipped.
    async fn execute(&self, runner: &str, cache_dir: &Path) -> StepCacheResult<()>;

    /// Human-readable description of the helper for logs
    fn describe(&self) -> String;
}
