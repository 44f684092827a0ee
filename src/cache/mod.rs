//! Step output caching
//!
//! Every step owns one directory under the cache root. That directory is the
//! unit of caching: it is restored before the runner executes and saved
//! afterwards under `<step name>-<version suffix>`.
//!
//! | Outcome | Before execution | After execution |
//! |---------|------------------|-----------------|
//! | Hit | restored from backend | not saved again |
//! | Miss | left absent | saved if the runner produced it |

pub mod backend;
pub mod key;
pub mod local;

pub use backend::CacheBackend;
pub use key::{CacheKey, StepName};
pub use local::{format_bytes, CacheEntry, LocalCacheBackend};
