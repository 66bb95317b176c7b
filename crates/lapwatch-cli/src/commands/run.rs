use chrono::Utc;
use clap::Args;
use lapwatch_core::{
    Config, Configuration, NotificationPort, NotificationSettings, Phase, PortError,
    ResourceGuard, StaticSettings, TimerEvent, TimerService, TimerState,
};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Args)]
pub struct RunArgs {
    /// Number of laps (1-999)
    #[arg(long, conflicts_with = "infinite")]
    laps: Option<u16>,
    /// Keep going until stopped
    #[arg(long)]
    infinite: bool,
    /// Work interval in seconds
    #[arg(long)]
    work: Option<u64>,
    /// Rest interval in seconds (0 = no rest)
    #[arg(long)]
    rest: Option<u64>,
    /// Wait for Enter at every boundary
    #[arg(long, conflicts_with = "auto")]
    manual: bool,
    /// Advance through boundaries automatically
    #[arg(long)]
    auto: bool,
    /// Print events as JSON lines instead of a status display
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn has_overrides(&self) -> bool {
        self.laps.is_some() || self.infinite || self.work.is_some() || self.rest.is_some()
    }

    /// The configured workout, with any command-line values laid over it.
    fn workout(&self, base: Configuration) -> Result<Configuration, Box<dyn std::error::Error>> {
        if !self.has_overrides() {
            return Ok(base);
        }
        let laps = if self.infinite {
            lapwatch_core::INFINITE_LAPS
        } else {
            self.laps.unwrap_or(base.laps())
        };
        let work = self.work.map(Duration::from_secs).unwrap_or(base.work());
        let rest = self.rest.map(Duration::from_secs).unwrap_or(base.rest());
        Ok(Configuration::adhoc(laps, work, rest)?)
    }

    fn notification_settings(&self, base: NotificationSettings) -> NotificationSettings {
        let auto_mode = match (self.auto, self.manual) {
            (true, _) => true,
            (_, true) => false,
            _ => base.auto_mode,
        };
        NotificationSettings { auto_mode, ..base }
    }
}

/// Rings the terminal bell and logs each alert.
struct TerminalNotifier;

impl TerminalNotifier {
    fn bell(settings: &NotificationSettings, times: usize) -> Result<(), PortError> {
        if !settings.sound {
            return Ok(());
        }
        let mut err = std::io::stderr();
        for _ in 0..times {
            err.write_all(b"\x07")?;
        }
        err.flush()?;
        Ok(())
    }
}

impl NotificationPort for TerminalNotifier {
    fn on_interval_complete(&self, settings: &NotificationSettings) -> Result<(), PortError> {
        info!("interval complete");
        Self::bell(settings, 1)
    }

    fn on_workout_complete(&self, settings: &NotificationSettings) -> Result<(), PortError> {
        info!("workout complete");
        Self::bell(settings, 3)
    }

    fn on_alarm_should_start(&self, settings: &NotificationSettings) -> Result<(), PortError> {
        info!("alarm: press Enter to continue");
        Self::bell(settings, 2)
    }

    fn on_alarm_should_stop(&self) -> Result<(), PortError> {
        debug!("alarm silenced");
        Ok(())
    }
}

/// Stands in for a wake lock; a terminal has nothing to hold.
struct LoggingGuard;

impl ResourceGuard for LoggingGuard {
    fn acquire(&self) -> Result<(), PortError> {
        debug!("wake guard acquired");
        Ok(())
    }

    fn release(&self) -> Result<(), PortError> {
        debug!("wake guard released");
        Ok(())
    }
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    let workout = args.workout(config.workout())?;
    let settings = args.notification_settings(config.notifications);

    if !args.has_overrides() {
        config.set_workout(&workout.touch(Utc::now()));
        if let Err(e) = config.save() {
            warn!(error = %e, "could not record last used workout");
        }
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(drive(workout, settings, config.timings(), args.json))
}

async fn drive(
    workout: Configuration,
    settings: NotificationSettings,
    timings: lapwatch_core::EngineTimings,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = TimerService::builder()
        .settings(StaticSettings::new(settings))
        .notifier(TerminalNotifier)
        .resource_guard(LoggingGuard)
        .timings(timings)
        .build();

    let mut states = service.subscribe();
    let mut events = service.subscribe_events();
    service.start(workout)?;
    if !json {
        eprintln!("keys: Enter = continue, p = pause/resume, s = skip rest, q = quit");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut status = tokio::time::interval(Duration::from_secs(1));
    let mut completed = false;

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if state.phase == Phase::Stopped {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => completed |= emit(&event, json)?,
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = status.tick(), if !json => {
                print_status(&service.snapshot(), service.remaining());
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => handle_key(&service, line.trim()),
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                service.stop();
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        completed |= emit(&event, json)?;
    }
    if !json {
        println!("{}", if completed { "workout complete" } else { "stopped" });
    }
    Ok(())
}

fn handle_key(service: &TimerService, key: &str) {
    let handled = match key {
        "" => service.dismiss_alarm().is_some(),
        "p" => {
            if service.snapshot().phase == Phase::Paused {
                service.resume().is_some()
            } else {
                service.pause().is_some()
            }
        }
        "s" => service.skip_rest().is_some(),
        "q" => {
            service.stop();
            true
        }
        other => {
            eprintln!("unknown key {other:?}: Enter, p, s or q");
            return;
        }
    };
    if !handled {
        debug!(key, "key had no effect in this phase");
    }
}

/// Print one event. Returns whether it marks the workout as complete.
fn emit(event: &TimerEvent, json: bool) -> Result<bool, serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        match event {
            TimerEvent::LapStarted { lap } => println!("lap {lap}"),
            TimerEvent::RestStarted { lap } => println!("rest after lap {lap}"),
            TimerEvent::Paused { .. } => println!("paused"),
            TimerEvent::Resumed { .. } => println!("resumed"),
            TimerEvent::AlarmStarted { .. } => println!("waiting - press Enter"),
            _ => {}
        }
    }
    Ok(matches!(event, TimerEvent::WorkoutCompleted { .. }))
}

fn print_status(state: &TimerState, remaining: Duration) {
    let secs = remaining.as_secs();
    let laps = if state.is_infinite() {
        format!("{}", state.current_lap)
    } else {
        format!("{}/{}", state.current_lap, state.total_laps)
    };
    println!(
        "{:<12} lap {:<7} {:02}:{:02}",
        state.phase.as_str(),
        laps,
        secs / 60,
        secs % 60
    );
}
