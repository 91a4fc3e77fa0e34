//! Accident detection policy: strongest candidate, confidence gate, debounce
//!
//! At most one accident is recorded per debounce window. The window is an
//! explicit state machine (armable + last trigger) re-checked every cycle,
//! including cycles with no detection at all.

use crate::domain::types::{AccidentDetection, AccidentLabel, AccidentSignal};
use tracing::{debug, info, warn};

/// Default minimum spacing between two recorded accidents (15 minutes)
pub const DEFAULT_DEBOUNCE_SECS: f64 = 900.0;

/// Default confidence a detection must exceed to fire
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.85;

/// Armable / disarmed debounce state
#[derive(Debug, Clone)]
pub struct AccidentDebounce {
    armable: bool,
    /// Monotonic seconds of the last recorded accident
    last_trigger: Option<f64>,
    window_secs: f64,
}

impl AccidentDebounce {
    pub fn new(window_secs: f64) -> Self {
        Self { armable: true, last_trigger: None, window_secs }
    }

    pub fn is_armable(&self) -> bool {
        self.armable
    }

    pub fn last_trigger(&self) -> Option<f64> {
        self.last_trigger
    }

    /// Re-arm once the window since the last trigger has passed.
    /// Returns true on the disarmed → armable transition.
    pub fn rearm(&mut self, now: f64) -> bool {
        if self.armable {
            return false;
        }
        let expired = match self.last_trigger {
            Some(t) => now - t > self.window_secs,
            None => true,
        };
        if expired {
            self.armable = true;
        }
        expired
    }

    /// Consume the armed state. Returns false when disarmed.
    pub fn trigger(&mut self, now: f64) -> bool {
        if !self.armable {
            return false;
        }
        self.armable = false;
        self.last_trigger = Some(now);
        true
    }
}

impl Default for AccidentDebounce {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_SECS)
    }
}

/// Applies the confidence threshold and debounce to accident candidates
pub struct AccidentDetector {
    threshold: f32,
    debounce: AccidentDebounce,
}

impl AccidentDetector {
    pub fn new(threshold: f32, window_secs: f64) -> Self {
        Self { threshold, debounce: AccidentDebounce::new(window_secs) }
    }

    /// Highest-confidence detection of a frame; ties keep the first seen
    pub fn strongest(detections: &[AccidentDetection]) -> Option<AccidentSignal> {
        let best = detections.iter().fold(None::<&AccidentDetection>, |best, d| match best {
            Some(b) if b.confidence >= d.confidence => Some(b),
            _ => Some(d),
        })?;
        match AccidentLabel::from_class_id(best.class_id) {
            Some(label) => Some(AccidentSignal { confidence: best.confidence, label }),
            None => {
                warn!(class_id = %best.class_id, "accident_class_unknown");
                None
            }
        }
    }

    /// Run one cycle of the policy. Returns the signal when it should be recorded.
    pub fn evaluate(&mut self, candidate: Option<AccidentSignal>, now: f64) -> Option<AccidentSignal> {
        if self.debounce.rearm(now) {
            info!("accident_detector_rearmed");
        }

        let signal = candidate?;
        if signal.confidence <= self.threshold {
            debug!(confidence = %signal.confidence, label = %signal.label, "accident_below_threshold");
            return None;
        }
        if !self.debounce.trigger(now) {
            debug!(confidence = %signal.confidence, label = %signal.label, "accident_debounced");
            return None;
        }
        Some(signal)
    }

    pub fn debounce(&self) -> &AccidentDebounce {
        &self.debounce
    }
}

impl Default for AccidentDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_DEBOUNCE_SECS)
    }
}
