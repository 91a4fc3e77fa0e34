//! Greedy IoU tracker
//!
//! Assigns persistent ids to per-frame detections by matching each detection
//! to the best-overlapping live track of the same class. Tracks that go
//! unmatched for `max_age` frames are dropped.

use crate::domain::types::{BBox, TrackId, TrackedObject};

/// One detector output box
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: i64,
}

#[derive(Debug, Clone)]
struct Track {
    id: TrackId,
    bbox: BBox,
    class_id: i64,
    missed: u32,
}

pub struct IouTracker {
    tracks: Vec<Track>,
    next_id: i64,
    iou_threshold: f32,
    max_age: u32,
}

impl IouTracker {
    pub fn new(iou_threshold: f32, max_age: u32) -> Self {
        Self { tracks: Vec::new(), next_id: 1, iou_threshold, max_age }
    }

    /// Associate this frame's detections; returns only objects seen this frame
    pub fn update(&mut self, mut detections: Vec<Detection>) -> Vec<TrackedObject> {
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut matched = vec![false; self.tracks.len()];
        let mut out = Vec::with_capacity(detections.len());

        for det in detections {
            let best = self
                .tracks
                .iter()
                .enumerate()
                .filter(|(i, t)| !matched[*i] && t.class_id == det.class_id)
                .map(|(i, t)| (i, t.bbox.iou(&det.bbox)))
                .filter(|(_, iou)| *iou >= self.iou_threshold)
                .max_by(|a, b| a.1.total_cmp(&b.1));

            let id = match best {
                Some((i, _)) => {
                    matched[i] = true;
                    let track = &mut self.tracks[i];
                    track.bbox = det.bbox;
                    track.missed = 0;
                    track.id
                }
                None => {
                    let id = TrackId(self.next_id);
                    self.next_id += 1;
                    self.tracks.push(Track {
                        id,
                        bbox: det.bbox,
                        class_id: det.class_id,
                        missed: 0,
                    });
                    matched.push(true);
                    id
                }
            };
            out.push(TrackedObject { track_id: id, bbox: det.bbox, class_id: det.class_id });
        }

        for (track, seen) in self.tracks.iter_mut().zip(&matched) {
            if !seen {
                track.missed += 1;
            }
        }
        let max_age = self.max_age;
        self.tracks.retain(|t| t.missed <= max_age);

        out
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }
}
