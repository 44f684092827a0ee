//! Error types for stepcache
//!
//! All modules use `StepCacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stepcache operations
pub type StepCacheResult<T> = Result<T, StepCacheError>;

/// All errors that can occur in stepcache
#[derive(Error, Debug)]
pub enum StepCacheError {
    // Runner helper errors
    #[error("Failed to enumerate steps ({command}): {reason}")]
    Enumeration { command: String, reason: String },

    #[error("Step execution failed: {command}, exit code: {code}")]
    Execution { command: String, code: i32 },

    #[error("Process terminated by signal: {0}")]
    ProcessSignaled(String),

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid step name {name:?}: {reason}")]
    InvalidStepName { name: String, reason: String },

    // Cache backend errors
    #[error("Can not restore cache for key {key}: {reason}")]
    CacheRestore { key: String, reason: String },

    #[error("Can not save cache for key {key}: {reason}")]
    CacheSave { key: String, reason: String },

    #[error("Cache entry not found: {0}")]
    CacheEntryNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Missing required input: {0}")]
    MissingInput(&'static str),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl StepCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an enumeration error
    pub fn enumeration(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Enumeration {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingInput("runner-name") => {
                Some("Pass --runner-name or set the `runner-name` action input")
            }
            Self::MissingInput("cache-version-suffix") => {
                Some("Pass --cache-version-suffix or set the `cache-version-suffix` action input")
            }
            Self::MissingInput("cache-dir") => {
                Some("Pass --cache-dir or set the `cache-dir` action input")
            }
            Self::CommandFailed { .. } => Some("Check the [helper] program in .stepcache.toml"),
            _ => None,
        }
    }
}
