//! Interval timer transition engine.
//!
//! The engine is a timestamp-driven state machine. It does not use internal
//! threads and never reads a clock itself - every command takes `now`, and
//! the caller is responsible for calling `evaluate()` often enough to notice
//! interval boundaries (see [`crate::service::TimerService`]).
//!
//! ## State Transitions
//!
//! ```text
//! Stopped -> Running <-> Paused
//! Running -> Resting <-> Paused
//! Resting -> Running (next lap)
//! Running | Resting -> AlarmActive (manual mode boundary)
//! AlarmActive -> Running | Resting | Stopped (dismissal)
//! * -> Stopped
//! ```
//!
//! Remaining time is always `interval - (running_before + (now - interval_start))`,
//! so a late or missed evaluation never loses or gains time.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(Configuration::default());
//! engine.start(config, clock.now())?;
//! // In a loop:
//! let events = engine.evaluate(clock.now(), Progression::Auto);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::config::Configuration;
use super::state::{Phase, TimerState};
use crate::error::TimerError;
use crate::events::TimerEvent;

/// How the timer behaves at an interval boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Progression {
    /// Boundaries advance on their own.
    Auto,
    /// Every boundary freezes in `AlarmActive` until dismissed.
    Manual,
}

impl Progression {
    /// `true` maps to `Auto`, as stored in the `auto_mode` setting.
    pub fn from_auto_mode(auto_mode: bool) -> Self {
        if auto_mode {
            Progression::Auto
        } else {
            Progression::Manual
        }
    }
}

/// Cadences of the live loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimings {
    /// Re-evaluation period while counting.
    pub tick: Duration,
    /// Pause of the loop after an automatic boundary, capped at the end of
    /// the interval that follows.
    pub transition_delay: Duration,
    /// Hold between auto-mode workout completion and `Stopped`.
    pub completion_delay: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            transition_delay: Duration::from_millis(1_000),
            completion_delay: Duration::from_millis(3_000),
        }
    }
}

/// Core timer engine.
///
/// Owns a single [`TimerState`] and replaces it wholesale on every
/// transition.
#[derive(Debug, Clone)]
pub struct TimerEngine {
    state: TimerState,
    completion_delay: Duration,
}

impl TimerEngine {
    /// Create an engine in the `Stopped` state, seeded from `configuration`.
    pub fn new(configuration: Configuration) -> Self {
        Self::with_timings(configuration, EngineTimings::default())
    }

    /// Like [`TimerEngine::new`], taking the completion hold from `timings`.
    pub fn with_timings(configuration: Configuration, timings: EngineTimings) -> Self {
        Self {
            state: TimerState::stopped(configuration),
            completion_delay: timings.completion_delay,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Current snapshot.
    pub fn state(&self) -> &TimerState {
        &self.state
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Remaining time of the current interval at `now`, clamped at zero.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.state.remaining_at(now)
    }

    /// Whether `evaluate(now)` would perform a transition.
    pub fn is_due(&self, now: Instant) -> bool {
        if let Some(deadline) = self.state.completes_at {
            return now >= deadline;
        }
        self.state.is_counting() && self.state.remaining_at(now).is_zero()
    }

    /// Next instant at which something will happen without user input.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state.completes_at {
            Some(deadline) => Some(deadline),
            None if self.state.is_counting() => self.state.interval_end(),
            None => None,
        }
    }

    /// Whether a periodic loop has anything to watch.
    pub fn needs_ticks(&self) -> bool {
        self.state.phase.is_interval()
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(
        &mut self,
        configuration: Configuration,
        now: Instant,
    ) -> Result<Vec<TimerEvent>, TimerError> {
        if self.state.phase != Phase::Stopped {
            return Err(TimerError::InvalidTransition {
                command: "start",
                phase: self.state.phase,
            });
        }

        info!(
            workout = configuration.id(),
            laps = configuration.laps(),
            work_secs = configuration.work().as_secs(),
            rest_secs = configuration.rest().as_secs(),
            "workout started"
        );
        let event = TimerEvent::Started {
            workout_id: configuration.id().to_string(),
            total_laps: configuration.laps(),
            work_secs: configuration.work().as_secs(),
            rest_secs: configuration.rest().as_secs(),
        };
        self.state = TimerState {
            phase: Phase::Running,
            interval_start: Some(now),
            ..TimerState::stopped(configuration)
        };
        Ok(vec![event])
    }

    /// Freeze the countdown. Ignored unless running or resting.
    pub fn pause(&mut self, now: Instant) -> Vec<TimerEvent> {
        if !self.state.is_counting() {
            debug!(phase = %self.state.phase, "pause ignored");
            return Vec::new();
        }

        let from = self.state.phase;
        let remaining = self.state.remaining_at(now);
        self.state = TimerState {
            phase: Phase::Paused,
            resume_phase: Some(from),
            time_remaining: remaining,
            running_before: self.state.elapsed_at(now),
            interval_start: None,
            is_paused: true,
            ..self.state.clone()
        };
        info!(from = %from, remaining_ms = millis(remaining), "paused");
        vec![TimerEvent::Paused {
            from,
            remaining_ms: millis(remaining),
        }]
    }

    /// Continue a paused countdown. Ignored unless paused.
    pub fn resume(&mut self, now: Instant) -> Vec<TimerEvent> {
        let into = match (self.state.phase, self.state.resume_phase) {
            (Phase::Paused, Some(into)) => into,
            _ => {
                debug!(phase = %self.state.phase, "resume ignored");
                return Vec::new();
            }
        };

        self.state = TimerState {
            phase: into,
            resume_phase: None,
            interval_start: Some(now),
            is_paused: false,
            ..self.state.clone()
        };
        info!(into = %into, remaining_ms = millis(self.state.time_remaining), "resumed");
        vec![TimerEvent::Resumed {
            into,
            remaining_ms: millis(self.state.time_remaining),
        }]
    }

    /// Return to `Stopped` from any phase. Always asks for the alarm to stop.
    pub fn stop(&mut self) -> Vec<TimerEvent> {
        if self.state.phase != Phase::Stopped {
            info!(phase = %self.state.phase, lap = self.state.current_lap, "stopped");
        }
        self.state = TimerState::stopped(self.state.configuration.clone());
        vec![TimerEvent::AlarmStopped, TimerEvent::Stopped]
    }

    /// Acknowledge a manual-mode alarm.
    ///
    /// Ends the workout if it is complete, otherwise starts the pending
    /// interval afresh. Ignored unless an alarm is active.
    pub fn dismiss_alarm(&mut self, now: Instant) -> Vec<TimerEvent> {
        if self.state.phase != Phase::AlarmActive {
            debug!(phase = %self.state.phase, "dismiss ignored");
            return Vec::new();
        }
        if is_workout_complete(&self.state) {
            return self.stop();
        }

        let into = self.state.resume_phase.unwrap_or(Phase::Running);
        // A pending lap advance is committed when the user lets it start.
        let lap = match into {
            Phase::Running => self.state.current_lap.saturating_add(1),
            _ => self.state.current_lap,
        };
        let duration = match into {
            Phase::Resting => self.state.configuration.rest(),
            _ => self.state.configuration.work(),
        };
        self.state = TimerState {
            phase: into,
            resume_phase: None,
            current_lap: lap,
            time_remaining: duration,
            interval_start: Some(now),
            running_before: Duration::ZERO,
            is_paused: false,
            ..self.state.clone()
        };
        info!(into = %into, lap, "alarm dismissed");
        let started = match into {
            Phase::Resting => TimerEvent::RestStarted { lap },
            _ => TimerEvent::LapStarted { lap },
        };
        vec![TimerEvent::AlarmStopped, started]
    }

    /// End the current rest right away, as if its countdown hit zero.
    pub fn skip_rest(&mut self, now: Instant, progression: Progression) -> Vec<TimerEvent> {
        if self.state.phase != Phase::Resting || self.state.completes_at.is_some() {
            debug!(phase = %self.state.phase, "skip rest ignored");
            return Vec::new();
        }
        let mut events = Vec::new();
        self.complete_interval(now, progression, &mut events);
        events
    }

    /// Re-evaluate against `now`, crossing at most one boundary.
    ///
    /// Also finishes the auto-mode completion hold once it has elapsed.
    pub fn evaluate(&mut self, now: Instant, progression: Progression) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        if !self.is_due(now) {
            return events;
        }
        if self.state.completes_at.is_some() {
            events.extend(self.stop());
            return events;
        }
        self.complete_interval(now, progression, &mut events);
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn complete_interval(
        &mut self,
        now: Instant,
        progression: Progression,
        events: &mut Vec<TimerEvent>,
    ) {
        let ended = self.state.phase;
        let lap = self.state.current_lap;
        info!(phase = %ended, lap, ?progression, "interval complete");
        events.push(TimerEvent::IntervalCompleted { lap, phase: ended });

        if ended == Phase::Running && self.state.configuration.has_rest() {
            let rest = self.state.configuration.rest();
            match progression {
                Progression::Auto => {
                    self.state = self.fresh_interval(Phase::Resting, lap, rest, now);
                    events.push(TimerEvent::RestStarted { lap });
                }
                Progression::Manual => {
                    self.state = self.frozen_alarm(Phase::Resting, lap, rest);
                    events.push(TimerEvent::AlarmStarted {
                        resume_phase: Phase::Resting,
                    });
                }
            }
            return;
        }

        self.advance_lap(now, progression, events);
    }

    fn advance_lap(&mut self, now: Instant, progression: Progression, events: &mut Vec<TimerEvent>) {
        let current = self.state.current_lap;
        let next = current.saturating_add(1);
        let work = self.state.configuration.work();

        if self.state.is_infinite() || next <= u32::from(self.state.total_laps) {
            match progression {
                Progression::Auto => {
                    self.state = self.fresh_interval(Phase::Running, next, work, now);
                    events.push(TimerEvent::LapStarted { lap: next });
                }
                Progression::Manual => {
                    self.state = self.frozen_alarm(Phase::Running, current, work);
                    events.push(TimerEvent::AlarmStarted {
                        resume_phase: Phase::Running,
                    });
                }
            }
            return;
        }

        let laps = self.state.total_laps;
        info!(laps, ?progression, "workout complete");
        events.push(TimerEvent::WorkoutCompleted { laps });
        match progression {
            Progression::Auto => {
                self.state = TimerState {
                    time_remaining: Duration::ZERO,
                    interval_start: None,
                    running_before: Duration::ZERO,
                    completes_at: Some(now + self.completion_delay),
                    ..self.state.clone()
                };
            }
            Progression::Manual => {
                self.state = self.frozen_alarm(Phase::Running, current, Duration::ZERO);
                events.push(TimerEvent::AlarmStarted {
                    resume_phase: Phase::Running,
                });
            }
        }
    }

    fn fresh_interval(&self, phase: Phase, lap: u32, duration: Duration, now: Instant) -> TimerState {
        TimerState {
            phase,
            resume_phase: None,
            current_lap: lap,
            time_remaining: duration,
            interval_start: Some(now),
            running_before: Duration::ZERO,
            is_paused: false,
            ..self.state.clone()
        }
    }

    fn frozen_alarm(&self, resume_phase: Phase, lap: u32, remaining: Duration) -> TimerState {
        TimerState {
            phase: Phase::AlarmActive,
            resume_phase: Some(resume_phase),
            current_lap: lap,
            time_remaining: remaining,
            interval_start: None,
            running_before: Duration::ZERO,
            is_paused: false,
            ..self.state.clone()
        }
    }
}

/// Whether dismissing the alarm in `state` ends the workout.
///
/// Finite laps and either past the last lap, or on the last lap with the
/// alarm raised on the way out of a work interval (nothing left to resume
/// but another lap that does not exist).
pub fn is_workout_complete(state: &TimerState) -> bool {
    if state.is_infinite() {
        return false;
    }
    let total = u32::from(state.total_laps);
    state.current_lap > total
        || (state.current_lap == total && state.resume_phase == Some(Phase::Running))
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn cfg(laps: u16, work: u64, rest: u64) -> Configuration {
        Configuration::new("t", laps, secs(work), secs(rest)).unwrap()
    }

    fn started(laps: u16, work: u64, rest: u64) -> (TimerEngine, ManualClock) {
        let clock = ManualClock::new();
        let mut engine = TimerEngine::new(cfg(laps, work, rest));
        engine.start(cfg(laps, work, rest), clock.now()).unwrap();
        (engine, clock)
    }

    #[test]
    fn start_pause_resume() {
        let (mut engine, clock) = started(3, 10, 5);
        assert_eq!(engine.phase(), Phase::Running);
        assert_eq!(engine.state().current_lap, 1);

        assert_eq!(engine.pause(clock.now()).len(), 1);
        assert_eq!(engine.phase(), Phase::Paused);
        assert!(engine.state().is_paused);

        assert_eq!(engine.resume(clock.now()).len(), 1);
        assert_eq!(engine.phase(), Phase::Running);
        assert!(!engine.state().is_paused);
    }

    #[test]
    fn start_while_running_is_rejected_without_side_effects() {
        let (mut engine, clock) = started(3, 10, 5);
        clock.advance(secs(2));
        let before = engine.state().clone();

        let err = engine.start(cfg(1, 5, 0), clock.now()).unwrap_err();
        assert_eq!(
            err,
            TimerError::InvalidTransition {
                command: "start",
                phase: Phase::Running
            }
        );
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn pause_and_resume_are_noops_in_wrong_phase() {
        let clock = ManualClock::new();
        let mut engine = TimerEngine::new(cfg(3, 10, 5));
        assert!(engine.pause(clock.now()).is_empty());
        assert!(engine.resume(clock.now()).is_empty());
        assert_eq!(engine.phase(), Phase::Stopped);

        engine.start(cfg(3, 10, 5), clock.now()).unwrap();
        assert!(engine.resume(clock.now()).is_empty());
        assert_eq!(engine.phase(), Phase::Running);
    }

    #[test]
    fn pause_captures_remaining_from_timestamps() {
        let (mut engine, clock) = started(1, 10, 0);
        clock.advance(Duration::from_millis(3_250));
        engine.pause(clock.now());
        assert_eq!(engine.state().time_remaining, Duration::from_millis(6_750));
        assert_eq!(engine.state().running_before, Duration::from_millis(3_250));
    }

    #[test]
    fn long_pause_does_not_lose_time() {
        let (mut engine, clock) = started(1, 10, 0);
        clock.advance(secs(3));
        engine.pause(clock.now());
        clock.advance(secs(600));
        engine.resume(clock.now());

        assert_eq!(engine.remaining_at(clock.now()), secs(7));
        clock.advance(secs(2));
        assert_eq!(engine.remaining_at(clock.now()), secs(5));
    }

    #[test]
    fn pause_while_resting_resumes_into_rest() {
        let (mut engine, clock) = started(2, 10, 5);
        clock.advance(secs(10));
        engine.evaluate(clock.now(), Progression::Auto);
        assert_eq!(engine.phase(), Phase::Resting);

        clock.advance(secs(2));
        engine.pause(clock.now());
        assert_eq!(engine.state().resume_phase, Some(Phase::Resting));
        clock.advance(secs(100));
        engine.resume(clock.now());
        assert_eq!(engine.phase(), Phase::Resting);
        assert_eq!(engine.remaining_at(clock.now()), secs(3));
    }

    #[test]
    fn evaluate_before_boundary_changes_nothing() {
        let (mut engine, clock) = started(2, 10, 5);
        clock.advance(Duration::from_millis(9_999));
        let before = engine.state().clone();
        assert!(engine.evaluate(clock.now(), Progression::Auto).is_empty());
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn work_without_rest_goes_straight_to_next_lap() {
        let (mut engine, clock) = started(3, 10, 0);
        clock.advance(secs(10));
        let events = engine.evaluate(clock.now(), Progression::Auto);
        assert_eq!(
            events,
            vec![
                TimerEvent::IntervalCompleted {
                    lap: 1,
                    phase: Phase::Running
                },
                TimerEvent::LapStarted { lap: 2 },
            ]
        );
        assert_eq!(engine.phase(), Phase::Running);
        assert_eq!(engine.state().current_lap, 2);
        assert_eq!(engine.remaining_at(clock.now()), secs(10));
    }

    #[test]
    fn auto_completion_holds_then_stops() {
        let (mut engine, clock) = started(1, 5, 0);
        clock.advance(secs(5));
        let events = engine.evaluate(clock.now(), Progression::Auto);
        assert!(events.contains(&TimerEvent::WorkoutCompleted { laps: 1 }));
        assert!(engine.state().completes_at.is_some());
        assert_eq!(engine.remaining_at(clock.now()), Duration::ZERO);

        // Commands other than stop are inert during the hold.
        assert!(engine.pause(clock.now()).is_empty());

        clock.advance(Duration::from_millis(2_999));
        assert!(engine.evaluate(clock.now(), Progression::Auto).is_empty());
        clock.advance(Duration::from_millis(1));
        let events = engine.evaluate(clock.now(), Progression::Auto);
        assert_eq!(events, vec![TimerEvent::AlarmStopped, TimerEvent::Stopped]);
        assert_eq!(engine.phase(), Phase::Stopped);
    }

    #[test]
    fn manual_rest_boundary_freezes_until_dismissed() {
        let (mut engine, clock) = started(2, 10, 5);
        clock.advance(secs(10));
        let events = engine.evaluate(clock.now(), Progression::Manual);
        assert_eq!(
            events.last(),
            Some(&TimerEvent::AlarmStarted {
                resume_phase: Phase::Resting
            })
        );
        assert_eq!(engine.phase(), Phase::AlarmActive);
        assert_eq!(engine.state().time_remaining, secs(5));

        // Frozen: nothing happens however long we wait.
        clock.advance(secs(300));
        assert!(engine.evaluate(clock.now(), Progression::Manual).is_empty());

        let events = engine.dismiss_alarm(clock.now());
        assert_eq!(
            events,
            vec![TimerEvent::AlarmStopped, TimerEvent::RestStarted { lap: 1 }]
        );
        assert_eq!(engine.phase(), Phase::Resting);
        assert_eq!(engine.remaining_at(clock.now()), secs(5));
    }

    #[test]
    fn manual_lap_advance_commits_on_dismissal() {
        let (mut engine, clock) = started(2, 10, 0);
        clock.advance(secs(10));
        engine.evaluate(clock.now(), Progression::Manual);
        assert_eq!(engine.phase(), Phase::AlarmActive);
        assert_eq!(engine.state().current_lap, 1);
        assert!(!is_workout_complete(engine.state()));

        engine.dismiss_alarm(clock.now());
        assert_eq!(engine.phase(), Phase::Running);
        assert_eq!(engine.state().current_lap, 2);
    }

    #[test]
    fn manual_single_lap_scenario() {
        let (mut engine, clock) = started(1, 5, 0);
        clock.advance(secs(5));
        let events = engine.evaluate(clock.now(), Progression::Manual);
        assert!(events.contains(&TimerEvent::WorkoutCompleted { laps: 1 }));
        assert_eq!(engine.phase(), Phase::AlarmActive);
        assert!(is_workout_complete(engine.state()));

        engine.dismiss_alarm(clock.now());
        assert_eq!(engine.phase(), Phase::Stopped);
    }

    #[test]
    fn last_lap_rest_alarm_is_not_completion() {
        let (mut engine, clock) = started(2, 10, 5);
        // lap 1 work, rest, then lap 2 work
        clock.advance(secs(10));
        engine.evaluate(clock.now(), Progression::Manual);
        engine.dismiss_alarm(clock.now());
        clock.advance(secs(5));
        engine.evaluate(clock.now(), Progression::Manual);
        engine.dismiss_alarm(clock.now());
        assert_eq!(engine.state().current_lap, 2);
        clock.advance(secs(10));
        engine.evaluate(clock.now(), Progression::Manual);

        assert_eq!(engine.state().resume_phase, Some(Phase::Resting));
        assert!(!is_workout_complete(engine.state()));
        engine.dismiss_alarm(clock.now());
        assert_eq!(engine.phase(), Phase::Resting);

        clock.advance(secs(5));
        let events = engine.evaluate(clock.now(), Progression::Manual);
        assert!(events.contains(&TimerEvent::WorkoutCompleted { laps: 2 }));
        engine.dismiss_alarm(clock.now());
        assert_eq!(engine.phase(), Phase::Stopped);
    }

    #[test]
    fn completion_rule_cases() {
        let mut state = TimerState::stopped(cfg(3, 10, 5));
        state.phase = Phase::AlarmActive;

        state.current_lap = 4;
        state.resume_phase = Some(Phase::Resting);
        assert!(is_workout_complete(&state));

        state.current_lap = 3;
        state.resume_phase = Some(Phase::Running);
        assert!(is_workout_complete(&state));

        state.resume_phase = Some(Phase::Resting);
        assert!(!is_workout_complete(&state));

        state.current_lap = 2;
        state.resume_phase = Some(Phase::Running);
        assert!(!is_workout_complete(&state));

        let mut infinite = TimerState::stopped(cfg(999, 10, 5));
        infinite.current_lap = 999;
        infinite.resume_phase = Some(Phase::Running);
        assert!(!is_workout_complete(&infinite));
    }

    #[test]
    fn skip_rest_only_applies_while_resting() {
        let (mut engine, clock) = started(2, 10, 5);
        assert!(engine.skip_rest(clock.now(), Progression::Auto).is_empty());

        clock.advance(secs(10));
        engine.evaluate(clock.now(), Progression::Auto);
        clock.advance(secs(1));
        let events = engine.skip_rest(clock.now(), Progression::Auto);
        assert_eq!(
            events,
            vec![
                TimerEvent::IntervalCompleted {
                    lap: 1,
                    phase: Phase::Resting
                },
                TimerEvent::LapStarted { lap: 2 },
            ]
        );
        assert_eq!(engine.phase(), Phase::Running);
        assert_eq!(engine.remaining_at(clock.now()), secs(10));
    }

    #[test]
    fn stop_from_every_phase_resets() {
        let (mut engine, clock) = started(2, 10, 5);
        engine.stop();
        assert_eq!(engine.state(), &TimerState::stopped(cfg(2, 10, 5)));

        engine.start(cfg(2, 10, 5), clock.now()).unwrap();
        engine.pause(clock.now());
        engine.stop();
        assert_eq!(engine.phase(), Phase::Stopped);

        engine.start(cfg(2, 10, 5), clock.now()).unwrap();
        clock.advance(secs(10));
        engine.evaluate(clock.now(), Progression::Manual);
        assert_eq!(engine.phase(), Phase::AlarmActive);
        engine.stop();
        engine.stop();
        assert_eq!(engine.phase(), Phase::Stopped);
        assert!(!engine.needs_ticks());
    }

    #[test]
    fn next_deadline_tracks_interval_end() {
        let (mut engine, clock) = started(2, 10, 5);
        let t0 = clock.now();
        assert_eq!(engine.next_deadline(), Some(t0 + secs(10)));

        clock.advance(secs(4));
        engine.pause(clock.now());
        assert_eq!(engine.next_deadline(), None);

        clock.advance(secs(50));
        engine.resume(clock.now());
        assert_eq!(engine.next_deadline(), Some(clock.now() + secs(6)));
    }
}
