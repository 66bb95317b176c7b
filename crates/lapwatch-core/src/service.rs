//! Live timer service.
//!
//! Wraps a [`TimerEngine`] in a mutex shared by the command methods and a
//! tokio re-evaluation loop, publishes every new [`TimerState`] on a watch
//! channel and forwards boundary events to the [`NotificationPort`].
//!
//! Ordering guarantees:
//! - commands and loop ticks are serialized on the engine mutex, which is
//!   never held across an `.await`
//! - a loop instance is tagged with a generation; any start, pause, resume,
//!   dismissal or stop bumps the generation and aborts the old task, and a
//!   tick that still gets through with a stale generation exits untouched
//! - the snapshot for a transition is published before its notifications are
//!   queued, and notifications are delivered in queue order
//! - after `stop()` only the stop-alarm notice from older runs is delivered;
//!   a workout that ends on its own keeps its queued alerts
//! - resource guard calls are best effort: errors and panics are logged

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::TimerError;
use crate::events::TimerEvent;
use crate::ports::{
    ConfigurationSource, NoopNotifier, NoopResourceGuard, NotificationPort,
    NotificationSettings, PortError, ResourceGuard, SettingsSource, StaticSettings,
};
use crate::timer::{Configuration, EngineTimings, Phase, TimerEngine, TimerState};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Handle to a running timer. Cheap to clone; all clones drive the same timer.
#[derive(Clone)]
pub struct TimerService {
    inner: Arc<Inner>,
}

struct Inner {
    core: Mutex<Core>,
    /// Loop instance counter.
    generation: AtomicU64,
    /// Run counter, bumped on start and on user-issued stops; shared with
    /// the dispatcher.
    epoch: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
    settings: Arc<dyn SettingsSource>,
    configuration: Option<Arc<dyn ConfigurationSource>>,
    guard: Arc<dyn ResourceGuard>,
    timings: EngineTimings,
    snapshots: watch::Sender<TimerState>,
    events: broadcast::Sender<TimerEvent>,
    notices: mpsc::UnboundedSender<Notice>,
}

struct Core {
    engine: TimerEngine,
    ticker: Option<JoinHandle<()>>,
    holds_guard: bool,
}

#[derive(Debug)]
struct Notice {
    epoch: u64,
    kind: NoticeKind,
}

#[derive(Debug, Clone, Copy)]
enum NoticeKind {
    IntervalComplete(NotificationSettings),
    WorkoutComplete(NotificationSettings),
    AlarmStart(NotificationSettings),
    AlarmStop,
}

impl NoticeKind {
    fn name(&self) -> &'static str {
        match self {
            NoticeKind::IntervalComplete(_) => "interval_complete",
            NoticeKind::WorkoutComplete(_) => "workout_complete",
            NoticeKind::AlarmStart(_) => "alarm_start",
            NoticeKind::AlarmStop => "alarm_stop",
        }
    }
}

/// Builder for [`TimerService`]. Every collaborator has a no-op default.
pub struct TimerServiceBuilder {
    clock: Arc<dyn Clock>,
    settings: Arc<dyn SettingsSource>,
    configuration: Option<Arc<dyn ConfigurationSource>>,
    notifier: Arc<dyn NotificationPort>,
    guard: Arc<dyn ResourceGuard>,
    timings: EngineTimings,
}

impl Default for TimerServiceBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            settings: Arc::new(StaticSettings::default()),
            configuration: None,
            notifier: Arc::new(NoopNotifier),
            guard: Arc::new(NoopResourceGuard),
            timings: EngineTimings::default(),
        }
    }
}

impl TimerServiceBuilder {
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn settings(mut self, settings: impl SettingsSource + 'static) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn configuration_source(mut self, source: impl ConfigurationSource + 'static) -> Self {
        self.configuration = Some(Arc::new(source));
        self
    }

    pub fn notifier(mut self, notifier: impl NotificationPort + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn resource_guard(mut self, guard: impl ResourceGuard + 'static) -> Self {
        self.guard = Arc::new(guard);
        self
    }

    pub fn timings(mut self, timings: EngineTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Build the service and spawn its notification dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> TimerService {
        let initial = self
            .configuration
            .as_ref()
            .map(|source| source.current_configuration())
            .unwrap_or_default();
        let engine = TimerEngine::with_timings(initial, self.timings);
        let (snapshots, _) = watch::channel(engine.state().clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let epoch = Arc::new(AtomicU64::new(0));

        tokio::spawn(dispatch_notices(notice_rx, self.notifier, Arc::clone(&epoch)));

        TimerService {
            inner: Arc::new(Inner {
                core: Mutex::new(Core {
                    engine,
                    ticker: None,
                    holds_guard: false,
                }),
                generation: AtomicU64::new(0),
                epoch,
                clock: self.clock,
                settings: self.settings,
                configuration: self.configuration,
                guard: self.guard,
                timings: self.timings,
                snapshots,
                events,
                notices,
            }),
        }
    }
}

impl TimerService {
    pub fn builder() -> TimerServiceBuilder {
        TimerServiceBuilder::default()
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Latest published state.
    pub fn snapshot(&self) -> TimerState {
        self.inner.snapshots.borrow().clone()
    }

    /// Stream of states; a new receiver sees the current one immediately.
    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.inner.snapshots.subscribe()
    }

    /// Stream of transition events from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TimerEvent> {
        self.inner.events.subscribe()
    }

    /// Remaining time of the current interval as of the service clock.
    pub fn remaining(&self) -> Duration {
        let now = self.inner.clock.now();
        self.inner.lock().engine.remaining_at(now)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start `configuration`. Rejected unless stopped.
    pub fn start(&self, configuration: Configuration) -> Result<TimerState, TimerError> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut core = inner.lock();
        let events = core.engine.start(configuration, now)?;

        inner.epoch.fetch_add(1, Ordering::SeqCst);
        core.holds_guard = guard_call("acquire", || inner.guard.acquire());
        let snapshot = inner.commit(&core, &events, None);
        restart_ticker(inner, &mut core, inner.timings.tick);
        Ok(snapshot)
    }

    /// Start the configuration source's current workout, or the last one
    /// run if there is no source.
    pub fn start_current(&self) -> Result<TimerState, TimerError> {
        let configuration = match &self.inner.configuration {
            Some(source) => source.current_configuration(),
            None => self.snapshot().configuration,
        };
        self.start(configuration)
    }

    /// Freeze the countdown. `None` if not running or resting.
    pub fn pause(&self) -> Option<TimerState> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut core = inner.lock();
        let events = core.engine.pause(now);
        if events.is_empty() {
            return None;
        }
        cancel_ticker(inner, &mut core);
        Some(inner.commit(&core, &events, None))
    }

    /// Continue after a pause. `None` if not paused.
    pub fn resume(&self) -> Option<TimerState> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut core = inner.lock();
        let events = core.engine.resume(now);
        if events.is_empty() {
            return None;
        }
        let snapshot = inner.commit(&core, &events, None);
        restart_ticker(inner, &mut core, inner.timings.tick);
        Some(snapshot)
    }

    /// Stop from any phase. Safe to call repeatedly.
    pub fn stop(&self) -> TimerState {
        let inner = &self.inner;
        let mut core = inner.lock();
        cancel_ticker(inner, &mut core);
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        let events = core.engine.stop();
        inner.release_guard(&mut core);
        inner.commit(&core, &events, None)
    }

    /// Acknowledge a manual-mode alarm. `None` if no alarm is active.
    pub fn dismiss_alarm(&self) -> Option<TimerState> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut core = inner.lock();
        let events = core.engine.dismiss_alarm(now);
        if events.is_empty() {
            return None;
        }
        if core.engine.phase() == Phase::Stopped {
            cancel_ticker(inner, &mut core);
            inner.epoch.fetch_add(1, Ordering::SeqCst);
            inner.release_guard(&mut core);
            return Some(inner.commit(&core, &events, None));
        }
        let snapshot = inner.commit(&core, &events, None);
        restart_ticker(inner, &mut core, inner.timings.tick);
        Some(snapshot)
    }

    /// End the current rest immediately. `None` unless resting.
    pub fn skip_rest(&self) -> Option<TimerState> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut core = inner.lock();
        if core.engine.phase() != Phase::Resting {
            return None;
        }
        let settings = inner.settings.notification_settings();
        let events = core.engine.skip_rest(now, settings.progression());
        if events.is_empty() {
            return None;
        }
        let snapshot = inner.commit(&core, &events, Some(settings));
        if core.engine.needs_ticks() {
            let delay = inner.transition_delay(&core, now);
            restart_ticker(inner, &mut core, delay);
        } else {
            cancel_ticker(inner, &mut core);
        }
        Some(snapshot)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish the engine's state, then queue notices for `events`.
    ///
    /// `settings` is read from the source on first need when not supplied.
    fn commit(
        &self,
        core: &Core,
        events: &[TimerEvent],
        mut settings: Option<NotificationSettings>,
    ) -> TimerState {
        let snapshot = core.engine.state().clone();
        self.snapshots.send_replace(snapshot.clone());

        let epoch = self.epoch.load(Ordering::SeqCst);
        for event in events {
            debug!(event = event.name(), "timer event");
            // No subscribers is fine.
            let _ = self.events.send(event.clone());

            let mut current = || *settings.get_or_insert_with(|| self.settings.notification_settings());
            let kind = match event {
                TimerEvent::IntervalCompleted { .. } => NoticeKind::IntervalComplete(current()),
                TimerEvent::WorkoutCompleted { .. } => NoticeKind::WorkoutComplete(current()),
                TimerEvent::AlarmStarted { .. } => NoticeKind::AlarmStart(current()),
                TimerEvent::AlarmStopped => NoticeKind::AlarmStop,
                _ => continue,
            };
            if self.notices.send(Notice { epoch, kind }).is_err() {
                warn!(notice = kind.name(), "notification dispatcher is gone");
            }
        }
        snapshot
    }

    /// One loop iteration. Returns the delay until the next one, or `None`
    /// when the loop should exit.
    fn tick(&self, generation: u64) -> Option<Duration> {
        let now = self.clock.now();
        let mut core = self.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "stale timer loop exiting");
            return None;
        }
        if !core.engine.is_due(now) {
            return Some(self.timings.tick);
        }

        let settings = self.settings.notification_settings();
        let events = core.engine.evaluate(now, settings.progression());
        if core.engine.phase() == Phase::Stopped {
            self.release_guard(&mut core);
        }
        self.commit(&core, &events, Some(settings));

        if !core.engine.needs_ticks() {
            // Frozen or stopped: this loop is done. Drop our own handle
            // without aborting it.
            core.ticker = None;
            return None;
        }
        if core.engine.state().completes_at.is_some() {
            return Some(self.timings.tick);
        }
        Some(self.transition_delay(&core, now))
    }

    /// Loop delay after an automatic boundary, capped at the next deadline.
    fn transition_delay(&self, core: &Core, now: Instant) -> Duration {
        match core.engine.next_deadline() {
            Some(deadline) => self
                .timings
                .transition_delay
                .min(deadline.saturating_duration_since(now)),
            None => self.timings.transition_delay,
        }
    }

    fn release_guard(&self, core: &mut Core) {
        if !core.holds_guard {
            return;
        }
        core.holds_guard = false;
        guard_call("release", || self.guard.release());
    }
}

/// Run a resource guard call. A panic counts as a failure; returns whether
/// the call succeeded.
fn guard_call(call: &'static str, f: impl FnOnce() -> Result<(), PortError>) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(call, error = %e, "resource guard failed");
            false
        }
        Err(_) => {
            warn!(call, "resource guard panicked");
            false
        }
    }
}

fn cancel_ticker(inner: &Arc<Inner>, core: &mut Core) {
    inner.generation.fetch_add(1, Ordering::SeqCst);
    if let Some(handle) = core.ticker.take() {
        handle.abort();
    }
}

fn restart_ticker(inner: &Arc<Inner>, core: &mut Core, first_delay: Duration) {
    cancel_ticker(inner, core);
    if !core.engine.needs_ticks() {
        return;
    }
    let generation = inner.generation.load(Ordering::SeqCst);
    debug!(generation, "timer loop started");
    core.ticker = Some(tokio::spawn(run_ticker(
        Arc::downgrade(inner),
        generation,
        first_delay,
    )));
}

async fn run_ticker(inner: Weak<Inner>, generation: u64, first_delay: Duration) {
    let mut delay = first_delay;
    loop {
        tokio::time::sleep(delay).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match inner.tick(generation) {
            Some(next) => delay = next,
            None => return,
        }
    }
}

/// Deliver notices in order on the blocking pool, so a slow or panicking
/// port never stalls the runtime or the engine.
async fn dispatch_notices(
    mut rx: mpsc::UnboundedReceiver<Notice>,
    notifier: Arc<dyn NotificationPort>,
    epoch: Arc<AtomicU64>,
) {
    while let Some(notice) = rx.recv().await {
        let current = epoch.load(Ordering::SeqCst);
        if notice.epoch != current && !matches!(notice.kind, NoticeKind::AlarmStop) {
            debug!(notice = notice.kind.name(), "dropping notice from a stopped run");
            continue;
        }

        let port = Arc::clone(&notifier);
        let kind = notice.kind;
        let delivered = tokio::task::spawn_blocking(move || match kind {
            NoticeKind::IntervalComplete(s) => port.on_interval_complete(&s),
            NoticeKind::WorkoutComplete(s) => port.on_workout_complete(&s),
            NoticeKind::AlarmStart(s) => port.on_alarm_should_start(&s),
            NoticeKind::AlarmStop => port.on_alarm_should_stop(),
        })
        .await;

        match delivered {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(notice = kind.name(), error = %e, "notification failed"),
            Err(e) => warn!(notice = kind.name(), error = %e, "notification panicked"),
        }
    }
    info!("notification dispatcher stopped");
}
