//! Object model sync replay
//!
//! Feeds recorded M409 JSON responses (one per line) through the sync engine
//! while a timer drives the poll scheduler, and prints outbound requests and
//! model events as JSON lines.

use anyhow::{Context, Result};
use clap::Parser;
use omsync::config::DEFAULT_CONFIG_PATH;
use omsync::json_feed::feed_line;
use omsync::json_output::{output, ReplaySummary};
use omsync::{EventLog, PollHost, SyncConfig, SyncEngine};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "omsync_replay")]
#[command(about = "Replay a controller transcript through the object model sync engine")]
#[command(version)]
struct Args {
    /// Path to the sync configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Transcript of JSON responses, one per line. Reads stdin when absent.
    #[arg(short, long)]
    input: Option<String>,

    /// How often the poll scheduler is ticked, in milliseconds
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,

    /// Print the final object model as JSON when the transcript ends
    #[arg(long)]
    dump_model: bool,
}

impl Args {
    fn get_config_path(&self) -> Option<String> {
        self.config
            .clone()
            .or_else(|| std::env::var("OMSYNC_CONFIG").ok())
            .or_else(|| {
                Path::new(DEFAULT_CONFIG_PATH)
                    .exists()
                    .then(|| DEFAULT_CONFIG_PATH.to_string())
            })
    }
}

/// Clock and request sink for a replay run
struct ReplayHost {
    started: Instant,
}

impl PollHost for ReplayHost {
    fn send_request(&mut self, request: &str) {
        debug!(request, "Request queued");
    }

    fn now_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

fn flush_events(engine: &mut SyncEngine<EventLog>, at_ms: u64) {
    for event in engine.observer_mut().take() {
        output::model_event(event, at_ms);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let config = match args.get_config_path() {
        Some(path) => {
            info!("Using config: {}", path);
            SyncConfig::load_from_path(&path)
                .with_context(|| format!("Failed to load config from {}", path))?
        }
        None => {
            info!("No config file found, using defaults");
            SyncConfig::default()
        }
    };

    let reader: Box<dyn AsyncRead + Unpin + Send> = match &args.input {
        Some(path) => {
            info!("Replaying {}", path);
            Box::new(
                tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open transcript {}", path))?,
            )
        }
        None => {
            info!("Replaying transcript from stdin");
            Box::new(tokio::io::stdin())
        }
    };
    let mut lines = BufReader::new(reader).lines();

    let started_at = chrono::Utc::now();
    let mut host = ReplayHost {
        started: Instant::now(),
    };
    let mut engine = SyncEngine::new(&config, EventLog::new());
    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));

    let mut line_count = 0usize;
    let mut request_count = 0usize;
    let mut error_count = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read transcript")? else {
                    info!("End of transcript");
                    break;
                };
                line_count += 1;
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let now = host.now_millis();
                if let Err(e) = feed_line(&mut engine, line, now) {
                    warn!("Line {}: {}", line_count, e);
                    output::transcript_error(line_count, &e.to_string());
                    error_count += 1;
                }
                flush_events(&mut engine, now);
            }
            _ = ticker.tick() => {
                if let Some(request) = engine.poll(&mut host) {
                    request_count += 1;
                    output::request_sent(&request, host.now_millis());
                }
                flush_events(&mut engine, host.now_millis());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    if args.dump_model {
        println!(
            "{}",
            serde_json::to_string_pretty(engine.store()).context("Failed to serialize model")?
        );
    }

    output::summary(ReplaySummary::new(
        started_at,
        line_count,
        request_count,
        error_count,
        engine.status(),
    ));
    info!("Replay complete");
    Ok(())
}
