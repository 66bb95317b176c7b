mod config;

pub use config::{Config, TimingConfig, WorkoutConfig};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/lapwatch[-dev]/` based on LAPWATCH_ENV.
///
/// Set LAPWATCH_ENV=dev to use the development directory, or
/// LAPWATCH_CONFIG_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("LAPWATCH_CONFIG_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir().ok_or(ConfigError::NoConfigDir)?.join(".config");
            let env = std::env::var("LAPWATCH_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("lapwatch-dev")
            } else {
                base_dir.join("lapwatch")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::SaveFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}
