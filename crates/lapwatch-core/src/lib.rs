//! # Lapwatch Core Library
//!
//! This library provides the interval timer behind lapwatch: a workout of N
//! laps, each a work countdown optionally followed by a rest countdown, with
//! pause/resume, an auto or manual progression mode and notifications at
//! every boundary.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A timestamp-driven state machine. Commands and
//!   `evaluate()` take the current instant; remaining time is always derived
//!   from timestamps, never from counting ticks
//! - **Service**: A tokio task that re-evaluates the engine while a
//!   countdown is live and publishes snapshots to subscribers
//! - **Ports**: Traits for notifications, settings, the default workout and
//!   the wake-lock equivalent
//! - **Storage**: TOML-based configuration
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`TimerService`]: Live countdown with snapshot and event streams
//! - [`Config`]: Application configuration management
//! - [`NotificationPort`]: Trait for alert delivery

pub mod clock;
pub mod error;
pub mod events;
pub mod ports;
pub mod service;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, TimerError, ValidationError};
pub use events::TimerEvent;
pub use ports::{
    ConfigurationSource, NoopNotifier, NoopResourceGuard, NotificationPort, NotificationSettings,
    PortError, ResourceGuard, SettingsSource, StaticSettings,
};
pub use service::{TimerService, TimerServiceBuilder};
pub use storage::Config;
pub use timer::{
    Configuration, EngineTimings, Phase, Progression, TimerEngine, TimerState, INFINITE_LAPS,
};
