//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `video` - ffmpeg-backed frame source
//! - `models` - tracker and accident classifier contracts
//! - `onnx` - ONNX Runtime model backend (feature `onnx`)
//! - `iou_tracker` - greedy IoU track association
//! - `thumbnail` - JPEG stills for accident records
//! - `store` - SQLite persistence gateway, opened lazily by the pipeline
//! - `egress` - snapshot and accident mirror to file (JSONL format)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod egress;
pub mod iou_tracker;
pub mod models;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod prometheus;
pub mod store;
pub mod thumbnail;
pub mod video;

// Re-export commonly used types
pub use models::{default_backend, AccidentClassifier, ModelBackend, ObjectTracker};
pub use store::{PersistenceGateway, ReopeningStore, SqliteStore};
pub use video::{FfmpegOpener, FfmpegSettings, ReadError, VideoOpener, VideoSource};
