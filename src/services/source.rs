//! Data sources and the three-tier fallback ladder
//!
//! The aggregation cycle only talks to a `DataSource`. `SourceSelector`
//! picks one at startup by walking the ladder (inference available, weights
//! present, tracker loads, accident model loads, video opens) and the
//! pipeline swaps in a synthetic source if the live one fails mid-run.
//! Degradation is one-way; only a restart returns to LIVE.

use crate::domain::snapshot::{ClassAccumulator, ClassReading};
use crate::domain::types::{AccidentSignal, Frame, Tick, VehicleClass};
use crate::infra::capabilities::Capabilities;
use crate::infra::config::Config;
use crate::infra::metrics::{TIER_DEGRADED, TIER_LIVE, TIER_SYNTHETIC};
use crate::io::models::{AccidentClassifier, ModelBackend, ObjectTracker};
use crate::io::thumbnail::{encode_thumbnail, placeholder_thumbnail};
use crate::io::video::{ReadError, VideoOpener, VideoSource};
use crate::services::accident::AccidentDetector;
use crate::services::pipeline::panic_message;
use crate::services::speed::{SpeedEstimator, SpeedSample};
use crate::services::synthetic::SyntheticGenerator;
use chrono::Timelike;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Active data mode for the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Live,
    DegradedModelOnly,
    Synthetic,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Live => "LIVE",
            Tier::DegradedModelOnly => "DEGRADED_MODEL_ONLY",
            Tier::Synthetic => "SYNTHETIC",
        }
    }

    /// Value for the tier gauge
    pub fn gauge(&self) -> u64 {
        match self {
            Tier::Live => TIER_LIVE,
            Tier::DegradedModelOnly => TIER_DEGRADED,
            Tier::Synthetic => TIER_SYNTHETIC,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-cycle source failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("video stream ended")]
    StreamEnded,
    #[error("video read failed: {0}")]
    Read(String),
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    #[error("inference failed: {0}")]
    Inference(String),
}

impl SourceError {
    /// Fatal errors end the source for the rest of the run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SourceError::Inference(_))
    }
}

impl From<ReadError> for SourceError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::EndOfStream => SourceError::StreamEnded,
            ReadError::Timeout(d) => SourceError::Timeout(d),
            ReadError::Io(msg) => SourceError::Read(msg),
        }
    }
}

/// One cycle's worth of traffic input
#[derive(Debug, Clone, PartialEq)]
pub enum Observations {
    /// Individual speed samples from tracked objects
    Samples(Vec<SpeedSample>),
    /// Pre-aggregated per-class readings
    Readings([ClassReading; 6]),
}

impl Observations {
    /// Add to the accumulator; returns the number of individual speed samples
    pub fn fold_into(&self, acc: &mut ClassAccumulator) -> u64 {
        match self {
            Observations::Samples(samples) => {
                for s in samples {
                    acc.record(s.class, s.speed);
                }
                samples.len() as u64
            }
            Observations::Readings(readings) => {
                for r in readings {
                    acc.record_bulk(r.class, r.count, r.avg_speed);
                }
                0
            }
        }
    }
}

/// What the aggregation cycle pulls from each cycle
pub trait DataSource: Send {
    fn tier(&self) -> Tier;
    fn next_observations(&mut self, tick: &Tick) -> Result<Observations, SourceError>;
    fn next_accident_signal(&mut self, tick: &Tick)
        -> Result<Option<AccidentSignal>, SourceError>;
    /// Encoded still for an accident record fired this cycle
    fn capture_image(&self) -> Vec<u8>;
}

/// Real video through the tracker and accident classifier
pub struct LiveSource {
    video: Box<dyn VideoSource>,
    tracker: Box<dyn ObjectTracker>,
    classifier: Option<Box<dyn AccidentClassifier>>,
    speed: SpeedEstimator,
    stale_track_secs: f64,
    frame: Option<Frame>,
}

impl LiveSource {
    pub fn new(
        video: Box<dyn VideoSource>,
        tracker: Box<dyn ObjectTracker>,
        classifier: Option<Box<dyn AccidentClassifier>>,
        speed: SpeedEstimator,
        stale_track_secs: f64,
    ) -> Self {
        Self { video, tracker, classifier, speed, stale_track_secs, frame: None }
    }

    pub fn accident_detection_enabled(&self) -> bool {
        self.classifier.is_some()
    }
}

impl DataSource for LiveSource {
    fn tier(&self) -> Tier {
        Tier::Live
    }

    fn next_observations(&mut self, tick: &Tick) -> Result<Observations, SourceError> {
        self.frame = None;
        let frame = self.video.read()?;
        let objects = self
            .tracker
            .track(&frame)
            .map_err(|e| SourceError::Inference(format!("{e:#}")));
        self.frame = Some(frame);
        let objects = objects?;

        let mut samples = Vec::new();
        for obj in &objects {
            let Some(class) = VehicleClass::from_coco_id(obj.class_id) else {
                continue;
            };
            if let Some(sample) =
                self.speed.observe(obj.track_id, obj.bbox.center(), tick.monotonic, class)
            {
                samples.push(sample);
            }
        }

        let pruned = self.speed.prune(tick.monotonic, self.stale_track_secs);
        debug!(
            objects = objects.len(),
            samples = samples.len(),
            pruned = pruned,
            tracked = self.speed.tracked(),
            "live_observations"
        );
        Ok(Observations::Samples(samples))
    }

    fn next_accident_signal(
        &mut self,
        _tick: &Tick,
    ) -> Result<Option<AccidentSignal>, SourceError> {
        let (Some(classifier), Some(frame)) = (self.classifier.as_mut(), self.frame.as_ref())
        else {
            return Ok(None);
        };
        match classifier.infer(frame) {
            Ok(detections) => Ok(AccidentDetector::strongest(&detections)),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "accident_inference_failed");
                Ok(None)
            }
        }
    }

    fn capture_image(&self) -> Vec<u8> {
        let Some(frame) = self.frame.as_ref() else {
            return placeholder_thumbnail();
        };
        encode_thumbnail(frame).unwrap_or_else(|e| {
            warn!(error = %format!("{e:#}"), "accident_thumbnail_failed");
            placeholder_thumbnail()
        })
    }
}

/// Generator-backed source, labelled with the tier it stands in for
pub struct SyntheticSource {
    tier: Tier,
    generator: SyntheticGenerator,
    placeholder: Vec<u8>,
}

impl SyntheticSource {
    pub fn new(tier: Tier, generator: SyntheticGenerator) -> Self {
        Self { tier, generator, placeholder: placeholder_thumbnail() }
    }

    /// Seeded when a seed is configured, OS entropy otherwise
    pub fn from_seed(tier: Tier, seed: Option<u64>) -> Self {
        let generator = match seed {
            Some(seed) => SyntheticGenerator::with_seed(seed),
            None => SyntheticGenerator::new(),
        };
        Self::new(tier, generator)
    }
}

impl DataSource for SyntheticSource {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn next_observations(&mut self, tick: &Tick) -> Result<Observations, SourceError> {
        Ok(Observations::Readings(self.generator.generate_traffic(tick.wall.hour())))
    }

    fn next_accident_signal(
        &mut self,
        _tick: &Tick,
    ) -> Result<Option<AccidentSignal>, SourceError> {
        Ok(self.generator.generate_accident().map(|label| AccidentSignal { confidence: 1.0, label }))
    }

    fn capture_image(&self) -> Vec<u8> {
        self.placeholder.clone()
    }
}

/// Startup tier selection
pub struct SourceSelector<'a> {
    config: &'a Config,
    capabilities: Capabilities,
    backend: Option<&'a dyn ModelBackend>,
    opener: &'a dyn VideoOpener,
}

impl<'a> SourceSelector<'a> {
    pub fn new(
        config: &'a Config,
        capabilities: Capabilities,
        backend: Option<&'a dyn ModelBackend>,
        opener: &'a dyn VideoOpener,
    ) -> Self {
        Self { config, capabilities, backend, opener }
    }

    /// Walk the ladder once and return the best available source
    ///
    /// A panic while loading models or opening the stream selects SYNTHETIC.
    pub fn select(&self) -> Box<dyn DataSource> {
        let source = match panic::catch_unwind(AssertUnwindSafe(|| self.try_live())) {
            Ok(source) => source,
            Err(payload) => self.synthetic(
                Tier::Synthetic,
                &format!("selection_panicked: {}", panic_message(payload.as_ref())),
            ),
        };
        info!(tier = %source.tier(), "source_selected");
        source
    }

    fn synthetic(&self, tier: Tier, reason: &str) -> Box<dyn DataSource> {
        warn!(tier = %tier, reason = %reason, "live_source_unavailable");
        Box::new(SyntheticSource::from_seed(tier, self.config.seed()))
    }

    fn try_live(&self) -> Box<dyn DataSource> {
        let backend = match self.backend {
            Some(backend) if self.capabilities.inference => backend,
            _ => return self.synthetic(Tier::Synthetic, "inference_unavailable"),
        };

        let model_path = self.config.model_path();
        if !model_path.is_file() {
            return self
                .synthetic(Tier::Synthetic, &format!("model_missing: {}", model_path.display()));
        }

        let tracker = match backend.load_tracker(model_path) {
            Ok(tracker) => tracker,
            Err(e) => {
                return self.synthetic(Tier::Synthetic, &format!("model_load_failed: {e:#}"))
            }
        };

        let classifier = self.load_accident_classifier(backend);

        if !self.capabilities.video {
            return self.synthetic(Tier::DegradedModelOnly, "video_unavailable");
        }
        let video = match self.opener.open(self.config.video_url()) {
            Ok(video) => video,
            Err(e) => {
                return self
                    .synthetic(Tier::DegradedModelOnly, &format!("video_open_failed: {e:#}"))
            }
        };

        let speed = SpeedEstimator::for_frame(
            self.config.region(),
            self.config.frame_width(),
            self.config.frame_height(),
        );
        info!(
            backend = %backend.name(),
            accident_detection = %classifier.is_some(),
            "live_source_ready"
        );
        Box::new(LiveSource::new(video, tracker, classifier, speed, self.config.stale_track_secs()))
    }

    /// Optional: absence or failure only disables accident detection
    fn load_accident_classifier(
        &self,
        backend: &dyn ModelBackend,
    ) -> Option<Box<dyn AccidentClassifier>> {
        let path = self.config.accident_model_path();
        if !path.is_file() {
            info!(path = %path.display(), "accident_model_missing");
            return None;
        }
        match backend.load_accident_classifier(path) {
            Ok(classifier) => Some(classifier),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "accident_model_load_failed");
                None
            }
        }
    }
}
