//! Gaptrack CLI
//!
//! Command-line front end for the gaptrack library:
//! - List recent sessions and their drivers
//! - Track the gap between two drivers live or over a finished session
//! - Record sessions and replay recordings
//! - Run an offline demo feed

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gaptrack_core::controller::{StartRequest, TrackingController, TrackingPhase};
use gaptrack_core::recording::{is_recording_path, list_recordings, recording_path, Recording};
use gaptrack_core::session::Roster;
use gaptrack_core::source::{
    DemoSource, HistoricalSource, LiveSource, OpenF1Client, SampleSource, SessionFilter, TimingApi,
};
use gaptrack_core::types::DriverId;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod output;

use config::{AppConfig, TuningArgs};

/// Gaptrack - follow the interval between two drivers
#[derive(Parser, Debug)]
#[command(name = "gaptrack")]
#[command(about = "Track the gap between two drivers and detect pit stops and trends", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (gaptrack.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List recent finished sessions
    Sessions {
        /// Season to list (default: current and previous)
        #[arg(long)]
        year: Option<i32>,

        /// Session type, e.g. "Race" or "Qualifying"
        #[arg(long = "type", value_name = "TYPE")]
        session_type: Option<String>,

        /// Maximum number of sessions
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// List the drivers of a session
    Drivers {
        /// Session key (default: the running session)
        session: Option<u32>,
    },

    /// Track two drivers in the running session or a finished one
    Track {
        /// First driver (number or acronym)
        driver_a: String,

        /// Second driver (number or acronym)
        driver_b: String,

        /// Finished session to load instead of the live feed
        #[arg(long, value_name = "KEY")]
        session: Option<u32>,

        /// Record to this name in the recordings directory
        #[arg(long, value_name = "NAME")]
        record: Option<String>,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Replay a recording through the detector
    Replay {
        /// Recording name or path
        recording: String,

        /// Replay speed factor (1.0 = real time)
        #[arg(long)]
        speed: Option<f64>,

        /// Load the readable part of a damaged recording
        #[arg(long)]
        salvage: bool,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// List recordings
    Recordings,

    /// Track a simulated feed without network access
    Demo {
        /// First driver (number or acronym)
        #[arg(default_value = "VER")]
        driver_a: String,

        /// Second driver (number or acronym)
        #[arg(default_value = "LEC")]
        driver_b: String,

        /// Random seed for the simulated feed
        #[arg(long, default_value_t = 7)]
        seed: u64,

        /// Record to this name in the recordings directory
        #[arg(long, value_name = "NAME")]
        record: Option<String>,

        #[command(flatten)]
        tuning: TuningArgs,
    },
}

/// Poll cadence used by the demo unless overridden; the feed is simulated
const DEMO_POLL_INTERVAL_MS: u64 = 200;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("gaptrack v{}", gaptrack_core::VERSION);
    let app = config::load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Sessions {
            year,
            session_type,
            limit,
        } => {
            let api = api_client(&app)?;
            let filter = SessionFilter {
                year,
                session_type,
                limit: Some(limit),
            };
            let sessions = api
                .list_historical_sessions(&filter)
                .await
                .context("Failed to list sessions")?;
            output::print_sessions(&sessions);
        }

        Command::Drivers { session } => {
            let api = api_client(&app)?;
            let key = session_key(&api, session).await?;
            let roster = api.get_drivers(key).await.context("Failed to load drivers")?;
            output::print_roster(&roster);
        }

        Command::Track {
            driver_a,
            driver_b,
            session,
            record,
            tuning,
        } => {
            let tracking = tuning.apply(app.tracking.clone())?;
            let api = api_client(&app)?;
            let key = session_key(&api, session).await?;
            let roster = api.get_drivers(key).await.context("Failed to load drivers")?;
            let a = resolve(&roster, &driver_a)?;
            let b = resolve(&roster, &driver_b)?;

            let source: Box<dyn SampleSource> = match session {
                Some(key) => Box::new(HistoricalSource::new(api, key, tracking.poll_interval())),
                None => Box::new(LiveSource::new(api)),
            };
            let mut request = StartRequest::new(a, b, source).with_config(tracking);
            if let Some(name) = record {
                request = request.record_to(recording_path(&app.recordings_dir, &name));
            }
            run(request).await?;
        }

        Command::Replay {
            recording,
            speed,
            salvage,
            tuning,
        } => {
            let path = locate_recording(&app, &recording);
            let loaded = if salvage {
                Recording::load_salvaged(&path)
            } else {
                Recording::load(&path)
            }
            .with_context(|| format!("Failed to load recording {:?}", path))?;
            if !loaded.is_complete() {
                println!("Recording {:?} was not finished; replaying what was written", path);
            }
            println!(
                "Replaying session {} ({} of session time)",
                loaded.header.session_id,
                output::format_time(loaded.duration())
            );

            let mut tracking = tuning.apply(app.tracking.clone())?;
            if let Some(speed) = speed {
                tracking.replay_speed = speed;
                tracking.validate().context("Invalid replay speed")?;
            }
            let pair = loaded.header.driver_pair;
            let source = loaded.into_replay(tracking.replay_speed);
            run(StartRequest::new(pair.a(), pair.b(), Box::new(source)).with_config(tracking)).await?;
        }

        Command::Recordings => {
            let names = list_recordings(&app.recordings_dir).with_context(|| {
                format!("Failed to read recordings directory {:?}", app.recordings_dir)
            })?;
            if names.is_empty() {
                println!("No recordings in {:?}", app.recordings_dir);
            }
            for name in names {
                println!("{}", name);
            }
        }

        Command::Demo {
            driver_a,
            driver_b,
            seed,
            record,
            tuning,
        } => {
            let mut base = app.tracking.clone();
            base.poll_interval_ms = DEMO_POLL_INTERVAL_MS;
            let tracking = tuning.apply(base)?;

            let source = DemoSource::new(seed);
            let roster = source.roster();
            let a = resolve(&roster, &driver_a)?;
            let b = resolve(&roster, &driver_b)?;

            let mut request = StartRequest::new(a, b, Box::new(source)).with_config(tracking);
            if let Some(name) = record {
                request = request.record_to(recording_path(&app.recordings_dir, &name));
            }
            run(request).await?;
        }
    }

    Ok(())
}

/// Run a session to its end (or Ctrl-C), printing as it goes
async fn run(request: StartRequest) -> Result<()> {
    let mut controller = TrackingController::new();
    let mut updates = controller.subscribe();
    controller.start(request).await?;

    let mut printed_points = 0;
    let mut printed_events = 0;
    loop {
        let snapshot = updates.borrow_and_update().clone();
        for point in &snapshot.points[printed_points..] {
            println!("{}", output::describe_point(point, snapshot.trend()));
        }
        for event in &snapshot.events[printed_events..] {
            println!(">> {}", output::describe_event(event, &snapshot.roster));
        }
        printed_points = snapshot.points.len();
        printed_events = snapshot.events.len();
        if snapshot.phase == TrackingPhase::Stopped {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                controller.stop().await;
            }
        }
    }

    controller.wait().await;
    output::print_summary(&controller.snapshot());
    Ok(())
}

fn api_client(app: &AppConfig) -> Result<OpenF1Client> {
    OpenF1Client::new(app.api.clone()).context("Failed to set up the timing API client")
}

/// The given session, or the one running now
async fn session_key(api: &OpenF1Client, session: Option<u32>) -> Result<u32> {
    if let Some(key) = session {
        return Ok(key);
    }
    match api
        .get_active_session()
        .await
        .context("Failed to look up the running session")?
    {
        Some(session) => {
            println!("Live: {}", session.display_name());
            Ok(session.session_key)
        }
        None => bail!("No session is running; pass --session to load a finished one"),
    }
}

fn resolve(roster: &Roster, name: &str) -> Result<DriverId> {
    match roster.resolve(name) {
        Some(driver) => Ok(driver),
        None if roster.is_empty() => name
            .parse::<u32>()
            .map(DriverId)
            .with_context(|| format!("Unknown driver '{}'", name)),
        None => bail!("Driver '{}' is not in this session", name),
    }
}

/// A recording name in the recordings directory, or a path as given
fn locate_recording(app: &AppConfig, recording: &str) -> PathBuf {
    let path = Path::new(recording);
    if is_recording_path(path) || path.components().count() > 1 {
        path.to_path_buf()
    } else {
        recording_path(&app.recordings_dir, recording)
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn,gaptrack_core=info,gaptrack=info",
            1 => "info,gaptrack_core=debug,gaptrack=debug",
            _ => "debug,gaptrack_core=trace,gaptrack=trace",
        }
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_recording() {
        let app = AppConfig::default();
        assert_eq!(
            locate_recording(&app, "monza"),
            PathBuf::from("recorded_sessions/monza.jsonl")
        );
        assert_eq!(locate_recording(&app, "monza.jsonl"), PathBuf::from("monza.jsonl"));
        assert_eq!(locate_recording(&app, "/tmp/x"), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_resolve_driver() {
        let roster = DemoSource::new(1).roster();
        assert_eq!(resolve(&roster, "lec").unwrap(), DriverId(16));
        assert_eq!(resolve(&roster, "44").unwrap(), DriverId(44));
        assert!(resolve(&roster, "ALO").is_err());
        assert_eq!(resolve(&Roster::default(), "14").unwrap(), DriverId(14));
    }

    #[test]
    fn test_cli_parses() {
        let args = Args::try_parse_from(["gaptrack", "-v", "track", "VER", "NOR", "--session", "9590"]).unwrap();
        assert_eq!(args.verbose, 1);
        match args.command {
            Command::Track { driver_a, session, .. } => {
                assert_eq!(driver_a, "VER");
                assert_eq!(session, Some(9590));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
