//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - The workout to run by default
//! - Notification preferences and auto/manual progression
//! - Loop cadences
//!
//! Configuration is stored at `~/.config/lapwatch/config.toml`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::config_dir;
use crate::error::ConfigError;
use crate::ports::{ConfigurationSource, NotificationSettings, SettingsSource};
use crate::timer::{Configuration, EngineTimings};

/// Default workout section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutConfig {
    #[serde(default = "default_workout_id")]
    pub id: String,
    #[serde(default = "default_laps")]
    pub laps: u16,
    #[serde(default = "default_work_secs")]
    pub work_secs: u64,
    #[serde(default = "default_rest_secs")]
    pub rest_secs: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

/// Loop cadence section, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_transition_delay_ms")]
    pub transition_delay_ms: u64,
    #[serde(default = "default_completion_delay_ms")]
    pub completion_delay_ms: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/lapwatch/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub workout: WorkoutConfig,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub timing: TimingConfig,
}

// Default functions
fn default_workout_id() -> String {
    "default".into()
}
fn default_laps() -> u16 {
    8
}
fn default_work_secs() -> u64 {
    30
}
fn default_rest_secs() -> u64 {
    15
}
fn default_tick_ms() -> u64 {
    100
}
fn default_transition_delay_ms() -> u64 {
    1_000
}
fn default_completion_delay_ms() -> u64 {
    3_000
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self {
            id: default_workout_id(),
            laps: default_laps(),
            work_secs: default_work_secs(),
            rest_secs: default_rest_secs(),
            last_used: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            transition_delay_ms: default_transition_delay_ms(),
            completion_delay_ms: default_completion_delay_ms(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let unknown = || ConfigError::UnknownKey(key.to_string());

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => serde_json::Value::Number(
                    value
                        .parse::<u64>()
                        .map_err(|e| invalid(e.to_string()))?
                        .into(),
                ),
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key, in memory only.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or leaves the workout out of range.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        *self = updated;
        Ok(())
    }

    /// Strict check of the workout section and cadences.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strict_workout()?;
        if self.timing.tick_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timing.tick_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    fn strict_workout(&self) -> Result<Configuration, ConfigError> {
        let w = &self.workout;
        Configuration::new(
            w.id.clone(),
            w.laps,
            Duration::from_secs(w.work_secs),
            Duration::from_secs(w.rest_secs),
        )
        .map_err(|e| ConfigError::InvalidValue {
            key: "workout".into(),
            message: e.to_string(),
        })
    }

    /// The default workout, clamped into range.
    pub fn workout(&self) -> Configuration {
        let w = &self.workout;
        let cfg = Configuration::clamped(
            w.id.clone(),
            w.laps,
            Duration::from_secs(w.work_secs),
            Duration::from_secs(w.rest_secs),
        );
        match w.last_used {
            Some(at) => cfg.touch(at),
            None => cfg,
        }
    }

    /// Store `cfg` as the default workout.
    pub fn set_workout(&mut self, cfg: &Configuration) {
        self.workout = WorkoutConfig {
            id: cfg.id().to_string(),
            laps: cfg.laps(),
            work_secs: cfg.work().as_secs(),
            rest_secs: cfg.rest().as_secs(),
            last_used: cfg.last_used(),
        };
    }

    pub fn timings(&self) -> EngineTimings {
        EngineTimings {
            tick: Duration::from_millis(self.timing.tick_ms.max(1)),
            transition_delay: Duration::from_millis(self.timing.transition_delay_ms),
            completion_delay: Duration::from_millis(self.timing.completion_delay_ms),
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

impl ConfigurationSource for Config {
    fn current_configuration(&self) -> Configuration {
        self.workout()
    }
}

impl SettingsSource for Config {
    fn notification_settings(&self) -> NotificationSettings {
        self.notifications
    }
}
