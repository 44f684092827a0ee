//! Run summary

use crate::cache::CacheKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// What happened to a step directory after execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Restored before execution, not saved again
    Hit,
    /// Saved to the backend
    Saved,
    /// Save was attempted and failed
    SaveFailed,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "hit"),
            Self::Saved => write!(f, "saved"),
            Self::SaveFailed => write!(f, "save failed"),
        }
    }
}

/// Post-execution record of one step directory
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Directory name under the cache root
    pub name: String,
    pub key: CacheKey,
    pub outcome: StepOutcome,
    /// Backend message for failed saves
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Paths forwarded from the step's manifest
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

/// Summary of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub runner: String,
    pub version_suffix: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Step names reported by the helper, in enumeration order
    pub enumerated: Vec<String>,
    /// One record per directory found under the cache root, sorted by name
    pub steps: Vec<StepReport>,
}

impl RunReport {
    fn names_with(&self, outcome: StepOutcome) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.outcome == outcome)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Directories that were cache hits
    pub fn hits(&self) -> Vec<&str> {
        self.names_with(StepOutcome::Hit)
    }

    /// Directories saved during this run
    pub fn saved(&self) -> Vec<&str> {
        self.names_with(StepOutcome::Saved)
    }

    /// Directories whose save failed
    pub fn save_failures(&self) -> Vec<&str> {
        self.names_with(StepOutcome::SaveFailed)
    }

    /// Enumerated steps that left no directory behind
    pub fn missing(&self) -> Vec<&str> {
        self.enumerated
            .iter()
            .filter(|name| !self.steps.iter().any(|s| &s.name == *name))
            .map(String::as_str)
            .collect()
    }
}
