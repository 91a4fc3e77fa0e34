//! Traffic observer - edge traffic and accident observation
//!
//! Turns a camera stream into per-class counts and speeds every cycle,
//! records debounced accident events, and falls back to synthetic data when
//! the models or the stream are unavailable.
//!
//! Module structure:
//! - `domain/` - Core types (vehicle classes, region, snapshots)
//! - `io/` - External interfaces (video, models, SQLite, egress, Prometheus)
//! - `services/` - Pipeline logic (speed, accidents, sources, aggregation cycle)
//! - `infra/` - Infrastructure (Config, Metrics, Capabilities)

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use traffic_observer::infra::config::DEFAULT_CONFIG_PATH;
use traffic_observer::infra::{Capabilities, Config, Metrics};
use traffic_observer::io::{
    default_backend, FfmpegOpener, FfmpegSettings, ReopeningStore, SqliteStore,
};
use traffic_observer::services::backfill::backfill;
use traffic_observer::services::{spawn_once, Pipeline, SourceSelector, SyntheticGenerator};

/// Traffic observer - edge traffic statistics and accident events
#[derive(Parser, Debug)]
#[command(name = "traffic-observer", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the observation pipeline until Ctrl-C (default)
    Run,
    /// Create the database schema and exit
    InitDb,
    /// Write hourly synthetic history for the last N days
    Backfill {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default: INFO, use RUST_LOG=debug for per-cycle snapshots
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await?,
        Command::InitDb => {
            SqliteStore::open(config.database_path())?;
            info!(database = %config.database_path().display(), "schema_ready");
        }
        Command::Backfill { days } => {
            let mut store = SqliteStore::open(config.database_path())?;
            let mut generator = match config.seed() {
                Some(seed) => SyntheticGenerator::with_seed(seed),
                None => SyntheticGenerator::new(),
            };
            backfill(&mut store, &mut generator, config.congestion(), Local::now(), days)?;
        }
    }

    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(git_hash = env!("GIT_HASH"), "traffic-observer starting");
    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        video_url = %config.video_url(),
        model_path = %config.model_path().display(),
        accident_model_path = %config.accident_model_path().display(),
        cycle_secs = %config.cycle_secs(),
        accident_confidence = %config.accident_confidence(),
        debounce_secs = %config.debounce_secs(),
        database = %config.database_path().display(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = traffic_observer::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let capabilities = Capabilities::detect(config.ffmpeg_binary());
    let cycle = Duration::from_secs(config.cycle_secs());
    let pipeline_config = config.clone();
    let pipeline_metrics = metrics.clone();
    let handle = spawn_once(
        move || build_pipeline(&pipeline_config, capabilities, pipeline_metrics),
        cycle,
        shutdown_rx,
    )?;

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = handle {
        tokio::task::spawn_blocking(move || handle.join())
            .await
            .context("pipeline join task failed")?
            .map_err(|_| anyhow::anyhow!("pipeline thread panicked"))?;
    }

    info!("traffic-observer shutdown complete");
    Ok(())
}

/// Runs on the pipeline thread: walk the source ladder
///
/// The database is opened on first write, so an unavailable store shows up
/// as per-cycle write failures instead of stopping the pipeline.
fn build_pipeline(
    config: &Config,
    capabilities: Capabilities,
    metrics: Arc<Metrics>,
) -> anyhow::Result<Pipeline> {
    let store = ReopeningStore::sqlite(config.database_path().to_path_buf());
    let backend = default_backend();
    let opener = FfmpegOpener::new(FfmpegSettings {
        binary: config.ffmpeg_binary().to_string(),
        width: config.frame_width(),
        height: config.frame_height(),
        read_timeout: config.read_timeout(),
    });
    let source = SourceSelector::new(config, capabilities, backend.as_deref(), &opener).select();
    Ok(Pipeline::new(config, source, Box::new(store), metrics))
}
