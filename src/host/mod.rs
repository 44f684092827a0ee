//! Hosting CI platform primitives
//!
//! The reconciler only needs to extend the job's executable search path and
//! publish outputs; the entry point additionally reports fatal failures.

mod github;

pub use github::GithubActions;

use crate::error::StepCacheResult;
use async_trait::async_trait;

/// Environment/metadata accessors of the hosting CI platform
#[async_trait]
pub trait HostEnvironment: Send + Sync {
    /// Append `path` to the search path of subsequent job steps
    async fn add_path(&self, path: &str) -> StepCacheResult<()>;

    /// Publish a named output of this job step
    async fn set_output(&self, name: &str, value: &str) -> StepCacheResult<()>;

    /// Mark the job step as failed with `message`
    fn set_failed(&self, message: &str);
}
