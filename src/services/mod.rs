//! Services - pipeline logic and state
//!
//! This module contains the core services:
//! - `speed` - vertical displacement per second between consecutive sightings
//!   of a track inside the region, one sample per track
//! - `accident` - confidence threshold and debounce for accident candidates
//! - `synthetic` - time-of-day traffic and accident generator
//! - `source` - data sources and the LIVE / DEGRADED_MODEL_ONLY / SYNTHETIC ladder
//! - `pipeline` - the aggregation cycle and its run loop
//! - `backfill` - hourly history for a fresh database

pub mod accident;
pub mod backfill;
pub mod pipeline;
pub mod source;
pub mod speed;
pub mod synthetic;

// Re-export commonly used types
pub use accident::AccidentDetector;
pub use pipeline::{spawn_once, CycleReport, Pipeline};
pub use source::{DataSource, SourceSelector, Tier};
pub use speed::SpeedEstimator;
pub use synthetic::SyntheticGenerator;
