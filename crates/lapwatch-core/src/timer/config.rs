//! Workout descriptor: lap count plus work and rest durations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ValidationError;

/// Lap count sentinel meaning "no fixed end".
pub const INFINITE_LAPS: u16 = 999;
pub const MIN_LAPS: u16 = 1;
pub const MIN_WORK: Duration = Duration::from_secs(1);
pub const MAX_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Immutable description of a workout.
///
/// Always within the domain limits: constructors validate or clamp, and
/// deserialization goes through the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConfiguration", into = "RawConfiguration")]
pub struct Configuration {
    id: String,
    laps: u16,
    work: Duration,
    rest: Duration,
    last_used: Option<DateTime<Utc>>,
}

/// Wire shape of a [`Configuration`]; durations in whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConfiguration {
    id: String,
    laps: u16,
    work_secs: u64,
    rest_secs: u64,
    #[serde(default)]
    last_used: Option<DateTime<Utc>>,
}

impl Configuration {
    /// Build a configuration, rejecting anything outside the limits.
    pub fn new(
        id: impl Into<String>,
        laps: u16,
        work: Duration,
        rest: Duration,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if !(MIN_LAPS..=INFINITE_LAPS).contains(&laps) {
            return Err(ValidationError::LapsOutOfRange(laps));
        }
        if work < MIN_WORK || work > MAX_INTERVAL {
            return Err(ValidationError::WorkOutOfRange(work));
        }
        if rest > MAX_INTERVAL {
            return Err(ValidationError::RestOutOfRange(rest));
        }
        Ok(Self {
            id,
            laps,
            work,
            rest,
            last_used: None,
        })
    }

    /// Build a configuration, clamping each value into range.
    ///
    /// An empty id is replaced with a generated one.
    pub fn clamped(id: impl Into<String>, laps: u16, work: Duration, rest: Duration) -> Self {
        let id = id.into();
        Self {
            id: if id.trim().is_empty() {
                generate_id()
            } else {
                id
            },
            laps: laps.clamp(MIN_LAPS, INFINITE_LAPS),
            work: work.clamp(MIN_WORK, MAX_INTERVAL),
            rest: rest.min(MAX_INTERVAL),
            last_used: None,
        }
    }

    /// Ad-hoc workout with a generated id.
    pub fn adhoc(laps: u16, work: Duration, rest: Duration) -> Result<Self, ValidationError> {
        Self::new(generate_id(), laps, work, rest)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn laps(&self) -> u16 {
        self.laps
    }

    pub fn work(&self) -> Duration {
        self.work
    }

    pub fn rest(&self) -> Duration {
        self.rest
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.last_used
    }

    pub fn is_infinite(&self) -> bool {
        self.laps == INFINITE_LAPS
    }

    /// Zero rest means laps go straight from work to work.
    pub fn has_rest(&self) -> bool {
        !self.rest.is_zero()
    }

    /// Copy of this configuration stamped as used at `at`.
    pub fn touch(&self, at: DateTime<Utc>) -> Self {
        Self {
            last_used: Some(at),
            ..self.clone()
        }
    }

    /// Total planned duration, `None` for infinite workouts.
    pub fn total_duration(&self) -> Option<Duration> {
        if self.is_infinite() {
            return None;
        }
        let per_lap = self.work + self.rest;
        Some(per_lap * u32::from(self.laps))
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            id: "default".into(),
            laps: 8,
            work: Duration::from_secs(30),
            rest: Duration::from_secs(15),
            last_used: None,
        }
    }
}

impl TryFrom<RawConfiguration> for Configuration {
    type Error = ValidationError;

    fn try_from(raw: RawConfiguration) -> Result<Self, Self::Error> {
        let mut cfg = Configuration::new(
            raw.id,
            raw.laps,
            Duration::from_secs(raw.work_secs),
            Duration::from_secs(raw.rest_secs),
        )?;
        cfg.last_used = raw.last_used;
        Ok(cfg)
    }
}

impl From<Configuration> for RawConfiguration {
    fn from(cfg: Configuration) -> Self {
        Self {
            id: cfg.id,
            laps: cfg.laps,
            work_secs: cfg.work.as_secs(),
            rest_secs: cfg.rest.as_secs(),
            last_used: cfg.last_used,
        }
    }
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
