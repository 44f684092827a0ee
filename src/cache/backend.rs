//! Cache backend abstraction
//!
//! A backend stores directory trees under string keys. Saving is
//! best-effort; callers decide whether a failure matters.

use crate::cache::key::CacheKey;
use crate::error::StepCacheResult;
use async_trait::async_trait;
use std::path::PathBuf;

/// Key-value blob cache over filesystem paths
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Populate `paths` from the entry stored under `key`
    ///
    /// Returns the matched key on a hit and `None` on a miss. On a miss the
    /// paths are left untouched and may not exist.
    async fn restore(&self, paths: &[PathBuf], key: &CacheKey) -> StepCacheResult<Option<CacheKey>>;

    /// Upload the current content of `paths` under `key`
    ///
    /// Fails if the key already exists.
    async fn save(&self, paths: &[PathBuf], key: &CacheKey) -> StepCacheResult<()>;

    /// Human-readable backend name for logs
    fn backend_name(&self) -> &'static str;
}
