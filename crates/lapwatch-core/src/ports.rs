//! Collaborators the timer service calls out to.
//!
//! Every port is best effort: the service logs a failing call and carries
//! on counting. None of them may block for long, since they run on the
//! notification dispatcher or inside a command.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::timer::{Configuration, Progression};

/// Error type returned by port implementations.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;

/// Notification preferences, read once per boundary transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub vibration: bool,
    #[serde(default = "default_true")]
    pub sound: bool,
    #[serde(default)]
    pub flash: bool,
    #[serde(default = "default_true")]
    pub auto_mode: bool,
}

fn default_true() -> bool {
    true
}

impl NotificationSettings {
    pub fn progression(&self) -> Progression {
        Progression::from_auto_mode(self.auto_mode)
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            vibration: true,
            sound: true,
            flash: false,
            auto_mode: true,
        }
    }
}

/// Provides the workout to run when none is passed explicitly.
pub trait ConfigurationSource: Send + Sync {
    fn current_configuration(&self) -> Configuration;
}

/// Provides the current notification preferences.
pub trait SettingsSource: Send + Sync {
    fn notification_settings(&self) -> NotificationSettings;
}

/// Alert delivery (sound, vibration, visual). Fire-and-forget.
pub trait NotificationPort: Send + Sync {
    /// Brief alert at every interval boundary, in both modes.
    fn on_interval_complete(&self, settings: &NotificationSettings) -> Result<(), PortError>;

    /// Distinct alert once the last lap is done.
    fn on_workout_complete(&self, settings: &NotificationSettings) -> Result<(), PortError>;

    /// Continuous alarm while a manual-mode boundary awaits dismissal.
    fn on_alarm_should_start(&self, settings: &NotificationSettings) -> Result<(), PortError>;

    /// Silence any alarm or vibration in progress.
    fn on_alarm_should_stop(&self) -> Result<(), PortError>;
}

/// Wake-lock equivalent held while a workout is active.
pub trait ResourceGuard: Send + Sync {
    fn acquire(&self) -> Result<(), PortError>;
    fn release(&self) -> Result<(), PortError>;
}

/// Fixed settings, optionally changed at runtime.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    inner: Arc<Mutex<NotificationSettings>>,
}

impl StaticSettings {
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(settings)),
        }
    }

    pub fn set(&self, settings: NotificationSettings) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = settings;
    }

    pub fn set_auto_mode(&self, auto_mode: bool) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).auto_mode = auto_mode;
    }
}

impl SettingsSource for StaticSettings {
    fn notification_settings(&self) -> NotificationSettings {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ConfigurationSource for Configuration {
    fn current_configuration(&self) -> Configuration {
        self.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl NotificationPort for NoopNotifier {
    fn on_interval_complete(&self, _settings: &NotificationSettings) -> Result<(), PortError> {
        Ok(())
    }

    fn on_workout_complete(&self, _settings: &NotificationSettings) -> Result<(), PortError> {
        Ok(())
    }

    fn on_alarm_should_start(&self, _settings: &NotificationSettings) -> Result<(), PortError> {
        Ok(())
    }

    fn on_alarm_should_stop(&self) -> Result<(), PortError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResourceGuard;

impl ResourceGuard for NoopResourceGuard {
    fn acquire(&self) -> Result<(), PortError> {
        Ok(())
    }

    fn release(&self) -> Result<(), PortError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_auto_with_sound_and_vibration() {
        let s = NotificationSettings::default();
        assert!(s.auto_mode && s.sound && s.vibration && !s.flash);
        assert_eq!(s.progression(), Progression::Auto);
    }

    #[test]
    fn static_settings_can_switch_to_manual() {
        let settings = StaticSettings::new(NotificationSettings::default());
        settings.set_auto_mode(false);
        assert_eq!(
            settings.notification_settings().progression(),
            Progression::Manual
        );
    }

    #[test]
    fn missing_settings_fields_use_defaults() {
        let s: NotificationSettings = serde_json::from_str(r#"{"flash": true}"#).unwrap();
        assert!(s.flash && s.auto_mode && s.sound);
    }
}
