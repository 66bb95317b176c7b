//! Core error types for lapwatch-core.
//!
//! Expected misuse of the timer (a command issued in the wrong phase) is a
//! [`TimerError`]; a workout descriptor outside the domain limits is a
//! [`ValidationError`]; the settings file has its own [`ConfigError`].
//! [`CoreError`] wraps all of them for callers that do not care which.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::timer::Phase;

/// Core error type for lapwatch-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Timer command rejected
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A command that was not applicable in the current phase.
///
/// The engine's state is untouched when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("cannot {command} while {phase}")]
    InvalidTransition { command: &'static str, phase: Phase },
}

/// Workout descriptor outside the domain limits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("lap count {0} out of range (1..=999)")]
    LapsOutOfRange(u16),

    #[error("work duration {0:?} out of range (1s..=10min)")]
    WorkOutOfRange(Duration),

    #[error("rest duration {0:?} out of range (0s..=10min)")]
    RestOutOfRange(Duration),

    #[error("workout id must not be empty")]
    EmptyId,
}

/// Settings file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Key not present in the settings tree
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Could not locate a config directory
    #[error("could not determine config directory")]
    NoConfigDir,
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
