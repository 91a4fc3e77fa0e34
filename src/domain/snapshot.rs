//! Per-cycle aggregation and the persisted units
//!
//! `ClassAccumulator` is folded during one aggregation cycle and finalized
//! into an immutable `TrafficSnapshot`. `AccidentRecord` is the row written
//! when the debounced accident detector fires.

use crate::domain::types::{AccidentLabel, VehicleClass};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Running count and speed sum for one class within a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ClassTotals {
    count: u32,
    speed_sum: f64,
}

/// Per-class accumulator, reset every cycle
#[derive(Debug, Clone, Default)]
pub struct ClassAccumulator {
    totals: [ClassTotals; 6],
}

impl ClassAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a single speed sample for one object
    pub fn record(&mut self, class: VehicleClass, speed: f64) {
        if !speed.is_finite() || speed < 0.0 {
            return;
        }
        let t = &mut self.totals[class.index()];
        t.count += 1;
        t.speed_sum += speed;
    }

    /// Fold a pre-aggregated reading (count objects averaging `avg_speed`)
    pub fn record_bulk(&mut self, class: VehicleClass, count: u32, avg_speed: f64) {
        if count == 0 || !avg_speed.is_finite() || avg_speed < 0.0 {
            return;
        }
        let t = &mut self.totals[class.index()];
        t.count += count;
        t.speed_sum += avg_speed * count as f64;
    }

    /// Total objects folded this cycle across all classes
    pub fn total_count(&self) -> u32 {
        self.totals.iter().map(|t| t.count).sum()
    }

    /// Zero all six classes
    pub fn reset(&mut self) {
        self.totals = Default::default();
    }

    /// Average speeds per class; zero-count classes report speed 0
    pub fn finalize(&self) -> [ClassReading; 6] {
        VehicleClass::ALL.map(|class| {
            let t = self.totals[class.index()];
            let avg_speed = if t.count > 0 { t.speed_sum / t.count as f64 } else { 0.0 };
            ClassReading { class, count: t.count, avg_speed }
        })
    }
}

/// Finalized count and average speed for one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassReading {
    pub class: VehicleClass,
    pub count: u32,
    pub avg_speed: f64,
}

/// Discretized congestion derived from volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CongestionLevel {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl CongestionLevel {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CongestionLevel::Low => "Low",
            CongestionLevel::Medium => "Medium",
            CongestionLevel::High => "High",
        }
    }
}

/// Volume boundaries between congestion levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CongestionThresholds {
    /// Volume at or above which congestion is Medium
    pub medium: f64,
    /// Volume at or above which congestion is High
    pub high: f64,
}

impl CongestionThresholds {
    pub fn classify(&self, volume: f64) -> CongestionLevel {
        if volume >= self.high {
            CongestionLevel::High
        } else if volume >= self.medium {
            CongestionLevel::Medium
        } else {
            CongestionLevel::Low
        }
    }
}

impl Default for CongestionThresholds {
    fn default() -> Self {
        Self { medium: 1000.0, high: 3000.0 }
    }
}

/// One aggregation cycle, as written to the `traffic` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSnapshot {
    pub recorded_at: DateTime<Local>,
    pub readings: [ClassReading; 6],
    /// Sum over classes of count × average speed
    pub volume: f64,
    pub congestion: CongestionLevel,
}

impl TrafficSnapshot {
    pub fn from_readings(
        recorded_at: DateTime<Local>,
        readings: [ClassReading; 6],
        thresholds: &CongestionThresholds,
    ) -> Self {
        let volume: f64 = readings.iter().map(|r| r.count as f64 * r.avg_speed).sum();
        let congestion = thresholds.classify(volume);
        Self { recorded_at, readings, volume, congestion }
    }

    pub fn reading(&self, class: VehicleClass) -> &ClassReading {
        &self.readings[class.index()]
    }

    pub fn total_count(&self) -> u32 {
        self.readings.iter().map(|r| r.count).sum()
    }
}

/// Incident severity, owned by the incident-management surface after insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Incident resolution status, owned by the incident-management surface after insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentStatus {
    #[default]
    Pending,
    Investigating,
    Resolved,
    Cancelled,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "PENDING",
            IncidentStatus::Investigating => "INVESTIGATING",
            IncidentStatus::Resolved => "RESOLVED",
            IncidentStatus::Cancelled => "CANCELLED",
        }
    }
}

/// A fired accident event, as written to the `accidents` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccidentRecord {
    pub recorded_at: DateTime<Local>,
    pub label: AccidentLabel,
    pub confidence: f32,
    /// JPEG thumbnail; empty when no imaging is available
    #[serde(skip)]
    pub image: Vec<u8>,
    pub severity: Severity,
    pub status: IncidentStatus,
}

impl AccidentRecord {
    pub fn new(
        recorded_at: DateTime<Local>,
        label: AccidentLabel,
        confidence: f32,
        image: Vec<u8>,
    ) -> Self {
        Self {
            recorded_at,
            label,
            confidence,
            image,
            severity: Severity::default(),
            status: IncidentStatus::default(),
        }
    }
}
