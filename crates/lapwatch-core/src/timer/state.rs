//! Timer snapshot value.
//!
//! A `TimerState` is never edited in place by the engine: every transition
//! builds the next value and swaps it in, so an observer always sees a
//! consistent snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use super::config::Configuration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No active workout.
    Stopped,
    /// Counting down a work interval.
    Running,
    /// Counting down a rest interval.
    Resting,
    /// Countdown frozen by the user; `resume_phase` says what to go back to.
    Paused,
    /// Boundary reached in manual mode; frozen until dismissed.
    AlarmActive,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Stopped => "stopped",
            Phase::Running => "running",
            Phase::Resting => "resting",
            Phase::Paused => "paused",
            Phase::AlarmActive => "alarm_active",
        }
    }

    /// Running or Resting.
    pub fn is_interval(self) -> bool {
        matches!(self, Phase::Running | Phase::Resting)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerState {
    pub phase: Phase,
    /// Interval phase to return to from `Paused` or `AlarmActive`.
    pub resume_phase: Option<Phase>,
    pub current_lap: u32,
    pub total_laps: u16,
    /// Remaining time as of the last evaluation.
    #[serde(rename = "time_remaining_ms", with = "duration_ms")]
    pub time_remaining: Duration,
    /// When the current unpaused stretch began; `None` unless counting.
    #[serde(skip)]
    pub interval_start: Option<Instant>,
    /// Running time accumulated by earlier stretches of this interval.
    #[serde(rename = "running_before_ms", with = "duration_ms")]
    pub running_before: Duration,
    pub is_paused: bool,
    pub configuration: Configuration,
    /// Auto-mode completion hold: the workout is over and the state drops
    /// to `Stopped` once the clock reaches this instant.
    #[serde(skip)]
    pub completes_at: Option<Instant>,
}

impl TimerState {
    /// The idle state for `configuration`. Used at startup, on stop and on
    /// completion.
    pub fn stopped(configuration: Configuration) -> Self {
        Self {
            phase: Phase::Stopped,
            resume_phase: None,
            current_lap: 1,
            total_laps: configuration.laps(),
            time_remaining: configuration.work(),
            interval_start: None,
            running_before: Duration::ZERO,
            is_paused: false,
            configuration,
            completes_at: None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.phase == Phase::Stopped
    }

    pub fn is_infinite(&self) -> bool {
        self.configuration.is_infinite()
    }

    /// Whether the countdown is live (not frozen, not holding for completion).
    pub fn is_counting(&self) -> bool {
        self.phase.is_interval() && self.completes_at.is_none()
    }

    /// The interval kind whose duration applies right now.
    pub fn interval_phase(&self) -> Option<Phase> {
        match self.phase {
            Phase::Running | Phase::Resting => Some(self.phase),
            Phase::Paused | Phase::AlarmActive => self.resume_phase,
            Phase::Stopped => None,
        }
    }

    /// Full length of the current interval.
    pub fn interval_duration(&self) -> Duration {
        match self.interval_phase() {
            Some(Phase::Resting) => self.configuration.rest(),
            _ => self.configuration.work(),
        }
    }

    /// Running time spent in the current interval as of `now`.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        match self.interval_start {
            Some(start) => self.running_before + now.saturating_duration_since(start),
            None => self.running_before,
        }
    }

    /// Remaining time derived from timestamps, clamped at zero.
    ///
    /// Frozen phases report the stored value.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        if !self.is_counting() {
            return self.time_remaining;
        }
        self.interval_duration().saturating_sub(self.elapsed_at(now))
    }

    /// Fraction of the current interval already spent, 0.0..=1.0.
    pub fn interval_progress(&self, now: Instant) -> f64 {
        let total = self.interval_duration();
        if total.is_zero() {
            return 1.0;
        }
        let remaining = self.remaining_at(now);
        1.0 - remaining.as_secs_f64() / total.as_secs_f64()
    }

    /// Instant at which the live interval reaches zero.
    pub fn interval_end(&self) -> Option<Instant> {
        let start = self.interval_start?;
        let left = self.interval_duration().saturating_sub(self.running_before);
        Some(start + left)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
