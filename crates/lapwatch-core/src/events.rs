use serde::{Deserialize, Serialize};

use crate::timer::Phase;

/// Every transition of the timer produces one or more events.
/// The live service turns them into notification calls; hosts may log them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerEvent {
    Started {
        workout_id: String,
        total_laps: u16,
        work_secs: u64,
        rest_secs: u64,
    },
    Paused {
        from: Phase,
        remaining_ms: u64,
    },
    Resumed {
        into: Phase,
        remaining_ms: u64,
    },
    /// A work or rest countdown reached zero (or rest was skipped).
    IntervalCompleted {
        lap: u32,
        phase: Phase,
    },
    RestStarted {
        lap: u32,
    },
    LapStarted {
        lap: u32,
    },
    /// Manual mode froze at a boundary; the continuous alarm should sound.
    AlarmStarted {
        resume_phase: Phase,
    },
    AlarmStopped,
    WorkoutCompleted {
        laps: u16,
    },
    Stopped,
}

impl TimerEvent {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            TimerEvent::Started { .. } => "started",
            TimerEvent::Paused { .. } => "paused",
            TimerEvent::Resumed { .. } => "resumed",
            TimerEvent::IntervalCompleted { .. } => "interval_completed",
            TimerEvent::RestStarted { .. } => "rest_started",
            TimerEvent::LapStarted { .. } => "lap_started",
            TimerEvent::AlarmStarted { .. } => "alarm_started",
            TimerEvent::AlarmStopped => "alarm_stopped",
            TimerEvent::WorkoutCompleted { .. } => "workout_completed",
            TimerEvent::Stopped => "stopped",
        }
    }
}
