mod config;
mod engine;
mod state;

pub use config::{Configuration, INFINITE_LAPS, MAX_INTERVAL, MIN_LAPS, MIN_WORK};
pub use engine::{is_workout_complete, EngineTimings, Progression, TimerEngine};
pub use state::{Phase, TimerState};
