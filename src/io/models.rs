//! Inference collaborators - object tracker and accident classifier contracts
//!
//! The pipeline only consumes these traits. A `ModelBackend` loads concrete
//! implementations from weight files; the ONNX backend lives behind the
//! `onnx` cargo feature.

use crate::domain::types::{AccidentDetection, Frame, TrackedObject};
use std::path::Path;

/// Detection + tracking model: persistent ids across frames
pub trait ObjectTracker: Send {
    fn track(&mut self, frame: &Frame) -> anyhow::Result<Vec<TrackedObject>>;
}

/// Accident classifier: confidence and involved-parties class per detection
pub trait AccidentClassifier: Send {
    fn infer(&mut self, frame: &Frame) -> anyhow::Result<Vec<AccidentDetection>>;
}

/// Loads models from weight files
pub trait ModelBackend {
    fn name(&self) -> &'static str;
    fn load_tracker(&self, path: &Path) -> anyhow::Result<Box<dyn ObjectTracker>>;
    fn load_accident_classifier(&self, path: &Path)
        -> anyhow::Result<Box<dyn AccidentClassifier>>;
}

/// The model backend compiled into this binary, if any
pub fn default_backend() -> Option<Box<dyn ModelBackend>> {
    #[cfg(feature = "onnx")]
    {
        Some(Box::new(crate::io::onnx::OnnxBackend::default()))
    }
    #[cfg(not(feature = "onnx"))]
    {
        None
    }
}
