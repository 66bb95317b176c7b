//! Clock abstraction.
//!
//! - `SystemClock`: delegates to `tokio::time::Instant`, so a paused tokio
//!   runtime (`start_paused = true`) drives it deterministically
//! - `ManualClock`: returns a controllable instant that only moves when
//!   `set()` or `advance()` is called

use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};

/// Source of monotonic timestamps for countdown math.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Live implementation backed by tokio time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Virtual clock for tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Create a clock fixed at the current instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(instant: Instant) -> Self {
        Self {
            current: Arc::new(Mutex::new(instant)),
        }
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += duration;
    }

    /// Jump to a specific instant. Callers must not move time backwards.
    pub fn set(&self, instant: Instant) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        debug_assert!(instant >= *current, "ManualClock moved backwards");
        *current = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now() - t0, Duration::from_secs(5));
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let t0 = clock.now();
        other.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - t0, Duration::from_millis(250));
    }

    #[test]
    fn manual_clock_set_jumps_forward() {
        let clock = ManualClock::new();
        let target = clock.now() + Duration::from_secs(600);
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[tokio::test(start_paused = true)]
    async fn system_clock_follows_paused_runtime() {
        let clock = SystemClock;
        let t0 = clock.now();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(clock.now() - t0, Duration::from_secs(3));
    }
}
