//! Speed estimation from consecutive in-region track positions
//!
//! Speed is the vertical pixel displacement per second between two sightings
//! of the same track. It is a relative, region-local proxy: the zone is laid
//! along the lane so vertical motion dominates, and no camera calibration is
//! applied.
//!
//! Each track contributes at most one sample for as long as it is known.

use crate::domain::region::point_in_region;
use crate::domain::types::{Point, TrackId, VehicleClass};
use crate::domain::Region;
use std::collections::HashMap;
use tracing::debug;

/// Per-track history
#[derive(Debug, Clone)]
struct TrackState {
    last_position: Point,
    last_seen: f64,
    sampled: bool,
}

/// A speed reading for one object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub track_id: TrackId,
    pub class: VehicleClass,
    /// Pixels per second, always finite and non-negative
    pub speed: f64,
}

/// Converts tracker sightings into speed samples
pub struct SpeedEstimator {
    /// Region corners in the same pixel space as observed positions
    quad: [Point; 4],
    tracks: HashMap<TrackId, TrackState>,
}

impl SpeedEstimator {
    pub fn new(quad: [Point; 4]) -> Self {
        Self { quad, tracks: HashMap::new() }
    }

    /// Estimator for frames of the given pixel size
    pub fn for_frame(region: &Region, width: u32, height: u32) -> Self {
        Self::new(region.scaled(width, height))
    }

    /// Record a sighting; returns a sample when this one completes a measurement
    pub fn observe(
        &mut self,
        track_id: TrackId,
        position: Point,
        timestamp: f64,
        class: VehicleClass,
    ) -> Option<SpeedSample> {
        let Some(state) = self.tracks.get_mut(&track_id) else {
            self.tracks.insert(
                track_id,
                TrackState { last_position: position, last_seen: timestamp, sampled: false },
            );
            return None;
        };

        let mut sample = None;
        if !state.sampled && point_in_region(position, &self.quad) {
            let elapsed = timestamp - state.last_seen;
            if elapsed > 0.0 {
                let speed = (position.y - state.last_position.y).abs() / elapsed;
                if speed.is_finite() {
                    state.sampled = true;
                    sample = Some(SpeedSample { track_id, class, speed });
                }
            } else {
                debug!(track_id = %track_id, elapsed = %elapsed, "speed_non_positive_elapsed");
            }
        }

        state.last_position = position;
        state.last_seen = timestamp;
        sample
    }

    /// Drop tracks not seen for longer than `max_age` seconds
    pub fn prune(&mut self, now: f64, max_age: f64) -> usize {
        let before = self.tracks.len();
        self.tracks.retain(|_, t| now - t.last_seen <= max_age);
        before - self.tracks.len()
    }

    /// Number of tracks with history
    pub fn tracked(&self) -> usize {
        self.tracks.len()
    }
}
