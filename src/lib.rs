//! stepcache - per-step result caching for CI runners
//!
//! Restores the cached output directory of every step a runner uses, runs
//! the runner, then saves the step outputs that were not cached yet.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod reconcile;
pub mod runner;

pub use error::{StepCacheError, StepCacheResult};
