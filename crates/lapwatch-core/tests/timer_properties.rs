//! Property tests for the transition engine.
//!
//! Every case drives a [`TimerEngine`] with a [`ManualClock`] and random
//! evaluation gaps, so late or irregular ticks are the norm rather than the
//! exception.

use lapwatch_core::timer::is_workout_complete;
use lapwatch_core::{
    Clock, Configuration, ManualClock, Phase, Progression, TimerEngine, TimerEvent, INFINITE_LAPS,
};
use proptest::prelude::*;
use std::time::Duration;

fn started(laps: u16, work: u64, rest: u64) -> (TimerEngine, ManualClock) {
    let cfg = Configuration::new(
        "prop",
        laps,
        Duration::from_secs(work),
        Duration::from_secs(rest),
    )
    .unwrap();
    let clock = ManualClock::new();
    let mut engine = TimerEngine::new(cfg.clone());
    engine.start(cfg, clock.now()).unwrap();
    (engine, clock)
}

/// Drive to `Stopped`, dismissing every alarm. Returns all events seen.
fn run_to_end(
    engine: &mut TimerEngine,
    clock: &ManualClock,
    steps: &[u64],
    progression: Progression,
) -> Vec<TimerEvent> {
    let mut events = Vec::new();
    for step in steps.iter().cycle().take(200_000) {
        if engine.phase() == Phase::Stopped {
            break;
        }
        clock.advance(Duration::from_millis(*step));
        if engine.phase() == Phase::AlarmActive {
            events.extend(engine.dismiss_alarm(clock.now()));
        } else {
            events.extend(engine.evaluate(clock.now(), progression));
        }
    }
    events
}

fn count(events: &[TimerEvent], pred: impl Fn(&TimerEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pause_never_loses_or_gains_time(
        work in 1u64..=600,
        before_ms in 0u64..600_000,
        gap_ms in 0u64..86_400_000,
    ) {
        let before_ms = before_ms % (work * 1_000);
        let (mut engine, clock) = started(1, work, 0);

        clock.advance(Duration::from_millis(before_ms));
        engine.pause(clock.now());
        clock.advance(Duration::from_millis(gap_ms));
        engine.resume(clock.now());

        let expected = Duration::from_secs(work) - Duration::from_millis(before_ms);
        prop_assert_eq!(engine.remaining_at(clock.now()), expected);
        prop_assert_eq!(engine.phase(), Phase::Running);
    }

    #[test]
    fn remaining_falls_by_exactly_the_elapsed_time(
        work in 1u64..=120,
        steps in proptest::collection::vec(1u64..2_000, 1..200),
    ) {
        let (engine, clock) = started(1, work, 0);
        let mut last = engine.remaining_at(clock.now());
        prop_assert_eq!(last, Duration::from_secs(work));
        for step in steps {
            clock.advance(Duration::from_millis(step));
            let now = engine.remaining_at(clock.now());
            prop_assert_eq!(now, last.saturating_sub(Duration::from_millis(step)));
            last = now;
        }
    }

    #[test]
    fn auto_workout_completes_exactly_once(
        laps in 1u16..=12,
        work in 1u64..=20,
        rest in 0u64..=10,
        steps in proptest::collection::vec(100u64..5_000, 1..32),
    ) {
        let (mut engine, clock) = started(laps, work, rest);
        let events = run_to_end(&mut engine, &clock, &steps, Progression::Auto);

        prop_assert_eq!(engine.phase(), Phase::Stopped);
        prop_assert_eq!(
            count(&events, |e| matches!(e, TimerEvent::WorkoutCompleted { .. })),
            1
        );
        let per_lap = if rest > 0 { 2 } else { 1 };
        prop_assert_eq!(
            count(&events, |e| matches!(e, TimerEvent::IntervalCompleted { .. })),
            usize::from(laps) * per_lap
        );
        prop_assert_eq!(
            count(&events, |e| matches!(e, TimerEvent::LapStarted { .. })),
            usize::from(laps) - 1
        );
    }

    #[test]
    fn manual_workout_completes_exactly_once(
        laps in 1u16..=8,
        work in 1u64..=20,
        rest in 0u64..=10,
        steps in proptest::collection::vec(100u64..5_000, 1..32),
    ) {
        let (mut engine, clock) = started(laps, work, rest);
        let events = run_to_end(&mut engine, &clock, &steps, Progression::Manual);

        prop_assert_eq!(engine.phase(), Phase::Stopped);
        prop_assert_eq!(
            count(&events, |e| matches!(e, TimerEvent::WorkoutCompleted { .. })),
            1
        );
        let per_lap = if rest > 0 { 2 } else { 1 };
        prop_assert_eq!(
            count(&events, |e| matches!(e, TimerEvent::AlarmStarted { .. })),
            usize::from(laps) * per_lap
        );
    }

    #[test]
    fn lap_stays_within_bounds(
        laps in 1u16..=6,
        work in 1u64..=10,
        rest in 0u64..=5,
        steps in proptest::collection::vec(50u64..3_000, 1..16),
        manual in any::<bool>(),
    ) {
        let progression = Progression::from_auto_mode(!manual);
        let (mut engine, clock) = started(laps, work, rest);
        for step in steps.iter().cycle().take(5_000) {
            if engine.phase() == Phase::Stopped {
                break;
            }
            let lap = engine.state().current_lap;
            prop_assert!(lap >= 1 && lap <= u32::from(laps));
            clock.advance(Duration::from_millis(*step));
            if engine.phase() == Phase::AlarmActive {
                engine.dismiss_alarm(clock.now());
            } else {
                engine.evaluate(clock.now(), progression);
            }
        }
    }

    #[test]
    fn infinite_workout_never_completes(
        work in 1u64..=5,
        rest in 0u64..=3,
        steps in proptest::collection::vec(100u64..3_000, 1..16),
        manual in any::<bool>(),
    ) {
        let progression = Progression::from_auto_mode(!manual);
        let (mut engine, clock) = started(INFINITE_LAPS, work, rest);
        for step in steps.iter().cycle().take(3_000) {
            clock.advance(Duration::from_millis(*step));
            let events = if engine.phase() == Phase::AlarmActive {
                prop_assert!(!is_workout_complete(engine.state()));
                engine.dismiss_alarm(clock.now())
            } else {
                engine.evaluate(clock.now(), progression)
            };
            prop_assert!(!events.iter().any(|e| matches!(e, TimerEvent::WorkoutCompleted { .. })), "unexpected WorkoutCompleted event");
            prop_assert_ne!(engine.phase(), Phase::Stopped);
        }
    }
}
