//! ONNX Runtime model backend (feature `onnx`)
//!
//! Both models are YOLOv8-style exports: one `images` input of shape
//! [1, 3, 640, 640] and one output of shape [1, 4 + classes, candidates].
//! The tracker runs the COCO detector and feeds an `IouTracker`; the
//! accident classifier reports every surviving box as a detection.

use crate::domain::types::{AccidentDetection, BBox, Frame, TrackedObject, VehicleClass};
use crate::io::iou_tracker::{Detection, IouTracker};
use crate::io::models::{AccidentClassifier, ModelBackend, ObjectTracker};
use anyhow::{bail, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{debug, info};

const INPUT_SIZE: u32 = 640;
const CONFIDENCE_THRESHOLD: f32 = 0.25;
const NMS_IOU: f32 = 0.45;
const TRACK_IOU: f32 = 0.3;
const TRACK_MAX_AGE: u32 = 30;

/// Letterbox transform from model space back to frame space
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

struct YoloModel {
    session: Session,
}

impl YoloModel {
    fn load(path: &Path) -> Result<Self> {
        info!(model = %path.display(), "loading_onnx_model");
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model {}", path.display()))?;
        Ok(Self { session })
    }

    /// Run one frame; `keep` filters raw class ids before NMS
    fn detect(&mut self, frame: &Frame, keep: impl Fn(i64) -> bool) -> Result<Vec<Detection>> {
        let (input, letterbox) = preprocess(frame)?;

        let shape = [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;
        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (out_shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        if out_shape.len() != 3 {
            bail!("unexpected output rank {}", out_shape.len());
        }
        let channels = out_shape[1] as usize;
        let candidates = out_shape[2] as usize;
        let detections = decode(data, channels, candidates, letterbox, keep);
        debug!(count = detections.len(), "onnx_detections");
        Ok(detections)
    }
}

/// Letterbox the BGR frame into a normalized CHW RGB tensor
fn preprocess(frame: &Frame) -> Result<(Vec<f32>, Letterbox)> {
    let rgb: Vec<u8> = frame.data.chunks_exact(3).flat_map(|px| [px[2], px[1], px[0]]).collect();
    let img = RgbImage::from_raw(frame.width, frame.height, rgb)
        .context("frame buffer does not match its dimensions")?;

    let scale =
        (INPUT_SIZE as f32 / frame.width as f32).min(INPUT_SIZE as f32 / frame.height as f32);
    let scaled_w = ((frame.width as f32 * scale) as u32).clamp(1, INPUT_SIZE);
    let scaled_h = ((frame.height as f32 * scale) as u32).clamp(1, INPUT_SIZE);
    let resized = imageops::resize(&img, scaled_w, scaled_h, FilterType::Triangle);

    let pad_x = (INPUT_SIZE - scaled_w) / 2;
    let pad_y = (INPUT_SIZE - scaled_h) / 2;
    let mut canvas = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgb([114, 114, 114]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut input = vec![0.0f32; 3 * plane];
    for (i, px) in canvas.pixels().enumerate() {
        for c in 0..3 {
            input[c * plane + i] = px[c] as f32 / 255.0;
        }
    }

    Ok((input, Letterbox { scale, pad_x: pad_x as f32, pad_y: pad_y as f32 }))
}

/// Decode a channel-major [4 + classes, candidates] output, then NMS
fn decode(
    data: &[f32],
    channels: usize,
    candidates: usize,
    letterbox: Letterbox,
    keep: impl Fn(i64) -> bool,
) -> Vec<Detection> {
    if channels <= 4 || data.len() < channels * candidates {
        return Vec::new();
    }
    let mut detections = Vec::new();

    for i in 0..candidates {
        let cx = data[i];
        let cy = data[candidates + i];
        let w = data[candidates * 2 + i];
        let h = data[candidates * 3 + i];

        let (best_class, confidence) = (4..channels)
            .map(|c| (c - 4, data[candidates * c + i]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        let class_id = best_class as i64;
        if confidence < CONFIDENCE_THRESHOLD || !keep(class_id) {
            continue;
        }

        let unbox = |v: f32, pad: f32| (v - pad) / letterbox.scale;
        detections.push(Detection {
            bbox: BBox {
                x1: unbox(cx - w / 2.0, letterbox.pad_x),
                y1: unbox(cy - h / 2.0, letterbox.pad_y),
                x2: unbox(cx + w / 2.0, letterbox.pad_x),
                y2: unbox(cy + h / 2.0, letterbox.pad_y),
            },
            confidence,
            class_id,
        });
    }

    nms(detections, NMS_IOU)
}

fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) >= iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

/// COCO detector plus IoU tracker
pub struct OnnxTracker {
    model: YoloModel,
    tracker: IouTracker,
}

impl ObjectTracker for OnnxTracker {
    fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedObject>> {
        let detections =
            self.model.detect(frame, |id| VehicleClass::from_coco_id(id).is_some())?;
        Ok(self.tracker.update(detections))
    }
}

pub struct OnnxAccidentClassifier {
    model: YoloModel,
}

impl AccidentClassifier for OnnxAccidentClassifier {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<AccidentDetection>> {
        let detections = self.model.detect(frame, |_| true)?;
        Ok(detections
            .into_iter()
            .map(|d| AccidentDetection { confidence: d.confidence, class_id: d.class_id })
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct OnnxBackend;

impl ModelBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load_tracker(&self, path: &Path) -> Result<Box<dyn ObjectTracker>> {
        Ok(Box::new(OnnxTracker {
            model: YoloModel::load(path)?,
            tracker: IouTracker::new(TRACK_IOU, TRACK_MAX_AGE),
        }))
    }

    fn load_accident_classifier(&self, path: &Path) -> Result<Box<dyn AccidentClassifier>> {
        Ok(Box::new(OnnxAccidentClassifier { model: YoloModel::load(path)? }))
    }
}
