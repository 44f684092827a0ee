//! Step names and the cache keys derived from them
//!
//! A cache key is `<step name>-<version suffix>`. The suffix is shared by the
//! whole invocation, so bumping it invalidates every step at once. The `-`
//! inside a step name is not escaped; a name like `a-v1` with suffix `v2`
//! and a name `a` with suffix `v1-v2` collide. Step names and the suffix come
//! from the same workflow configuration, so this is accepted.

use crate::error::{StepCacheError, StepCacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Identifier of a step, also used as its directory name under the cache root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepName(String);

impl StepName {
    /// Validate a step name
    ///
    /// The name must be usable as a single path segment.
    pub fn new(name: impl Into<String>) -> StepCacheResult<Self> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name == "." || name == ".." {
            Some("name is a relative path component")
        } else if name.contains('/') || name.contains('\\') {
            Some("name contains a path separator")
        } else if name.contains('\0') {
            Some("name contains a NUL byte")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(StepCacheError::InvalidStepName {
                name,
                reason: reason.to_string(),
            }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory holding this step's output under `cache_dir`
    pub fn dir_in(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(&self.0)
    }
}

impl TryFrom<String> for StepName {
    type Error = StepCacheError;

    fn try_from(value: String) -> StepCacheResult<Self> {
        Self::new(value)
    }
}

impl From<StepName> for String {
    fn from(name: StepName) -> Self {
        name.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Key under which a step's output directory is stored in the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a step directory name
    pub fn for_step(name: &str, version_suffix: &str) -> Self {
        Self(format!("{}-{}", name, version_suffix))
    }

    /// Wrap a key read back from the backend
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}
