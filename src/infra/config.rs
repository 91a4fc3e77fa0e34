//! Configuration loading from TOML files
//!
//! The binary selects the config file (clap, `env` feature) from:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every key has a default, so a missing file still yields a runnable config.

use crate::domain::region::Region;
use crate::domain::snapshot::CongestionThresholds;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/dev.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier used as the metrics label
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "sftm".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub video_url: String,
    pub model_path: PathBuf,
    pub accident_model_path: PathBuf,
    pub frame_width: u32,
    pub frame_height: u32,
    pub read_timeout_ms: u64,
    /// ffmpeg executable used to decode the stream
    pub ffmpeg: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            video_url: "rtsp://127.0.0.1:8554/traffic".to_string(),
            model_path: PathBuf::from("models/yolov8n.onnx"),
            accident_model_path: PathBuf::from("models/accident_detection.onnx"),
            frame_width: 640,
            frame_height: 360,
            read_timeout_ms: 10_000,
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RegionConfig {
    /// Four fractional [x, y] corners in order A, B, C, D
    #[serde(default)]
    pub points: Option<Vec<[f64; 2]>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cycle_secs: u64,
    pub accident_confidence: f32,
    pub debounce_secs: f64,
    pub stale_track_secs: f64,
    /// Fixed RNG seed for reproducible synthetic runs
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cycle_secs: 2,
            accident_confidence: 0.85,
            debounce_secs: 900.0,
            stale_track_secs: 60.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CongestionConfig {
    pub medium_volume: f64,
    pub high_volume: f64,
}

impl Default for CongestionConfig {
    fn default() -> Self {
        let thresholds = CongestionThresholds::default();
        Self { medium_volume: thresholds.medium, high_volume: thresholds.high }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { database: default_database() }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("instance/sftm.sqlite")
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EgressConfig {
    /// JSONL mirror of persisted rows; absent disables the mirror
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: default_prometheus_port() }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub region: RegionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub congestion: CongestionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    video_url: String,
    model_path: PathBuf,
    accident_model_path: PathBuf,
    frame_width: u32,
    frame_height: u32,
    read_timeout_ms: u64,
    ffmpeg_binary: String,
    region: Region,
    cycle_secs: u64,
    accident_confidence: f32,
    debounce_secs: f64,
    stale_track_secs: f64,
    seed: Option<u64>,
    congestion: CongestionThresholds,
    database_path: PathBuf,
    egress_file: Option<String>,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let region = match toml_config.region.points {
            None => Region::default(),
            Some(points) => Region::from_pairs(&points).unwrap_or_else(|e| {
                warn!(error = %e, "invalid_region_using_default");
                Region::default()
            }),
        };

        let mut congestion = CongestionThresholds {
            medium: toml_config.congestion.medium_volume,
            high: toml_config.congestion.high_volume,
        };
        if !(congestion.medium.is_finite() && congestion.high >= congestion.medium) {
            warn!(
                medium = %congestion.medium,
                high = %congestion.high,
                "invalid_congestion_thresholds_using_default"
            );
            congestion = CongestionThresholds::default();
        }

        let source = toml_config.source;
        let pipeline = toml_config.pipeline;
        Self {
            site_id: toml_config.site.id,
            video_url: source.video_url,
            model_path: source.model_path,
            accident_model_path: source.accident_model_path,
            frame_width: source.frame_width,
            frame_height: source.frame_height,
            read_timeout_ms: source.read_timeout_ms,
            ffmpeg_binary: source.ffmpeg,
            region,
            cycle_secs: pipeline.cycle_secs.max(1),
            accident_confidence: pipeline.accident_confidence,
            debounce_secs: pipeline.debounce_secs,
            stale_track_secs: pipeline.stale_track_secs,
            seed: pipeline.seed,
            congestion,
            database_path: toml_config.storage.database,
            egress_file: toml_config.egress.file.filter(|f| !f.is_empty()),
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file,
        }
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                let mut config = Self::default();
                config.config_file = format!("default (missing {path})");
                config
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn video_url(&self) -> &str {
        &self.video_url
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn accident_model_path(&self) -> &Path {
        &self.accident_model_path
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }

    pub fn frame_height(&self) -> u32 {
        self.frame_height
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn ffmpeg_binary(&self) -> &str {
        &self.ffmpeg_binary
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn cycle_secs(&self) -> u64 {
        self.cycle_secs
    }

    pub fn accident_confidence(&self) -> f32 {
        self.accident_confidence
    }

    pub fn debounce_secs(&self) -> f64 {
        self.debounce_secs
    }

    pub fn stale_track_secs(&self) -> f64 {
        self.stale_track_secs
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn congestion(&self) -> &CongestionThresholds {
        &self.congestion
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn egress_file(&self) -> Option<&str> {
        self.egress_file.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point at temporary model files
    pub fn with_model_paths(mut self, model: PathBuf, accident_model: PathBuf) -> Self {
        self.model_path = model;
        self.accident_model_path = accident_model;
        self
    }

    /// Builder method for tests to fix the RNG seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
