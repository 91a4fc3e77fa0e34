//! Synthetic traffic generator
//!
//! Produces plausible per-class counts and speeds keyed by time of day, and
//! occasional accident candidates. Used whenever real inference is not
//! available. Accident candidates still go through the normal debounce.

use crate::domain::snapshot::ClassReading;
use crate::domain::types::{AccidentLabel, VehicleClass};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

/// Chance that a cycle produces an accident candidate
pub const ACCIDENT_PROBABILITY: f64 = 0.05;

/// Typical objects per cycle at a multiplier of 1.0
pub fn base_level(class: VehicleClass) -> f64 {
    match class {
        VehicleClass::Person => 15.0,
        VehicleClass::Bicycle => 8.0,
        VehicleClass::Car => 45.0,
        VehicleClass::Motorcycle => 12.0,
        VehicleClass::Bus => 6.0,
        VehicleClass::Truck => 4.0,
    }
}

/// Typical speed for the class
pub fn base_speed(class: VehicleClass) -> f64 {
    match class {
        VehicleClass::Person => 5.0,
        VehicleClass::Bicycle => 15.0,
        VehicleClass::Car => 35.0,
        VehicleClass::Motorcycle => 40.0,
        VehicleClass::Bus => 25.0,
        VehicleClass::Truck => 30.0,
    }
}

/// Live traffic multiplier for an hour of the day
pub fn traffic_multiplier(hour: u32) -> f64 {
    match hour {
        7..=9 | 17..=19 => 1.8,
        10..=16 => 1.2,
        20..=22 => 0.8,
        _ => 0.3,
    }
}

/// Smoother multiplier used for hourly chart backfill
pub fn hourly_multiplier(hour: u32) -> f64 {
    match hour {
        7..=9 | 17..=19 => 1.5,
        10..=16 => 1.0,
        20..=22 => 0.7,
        _ => 0.3,
    }
}

pub struct SyntheticGenerator {
    rng: StdRng,
}

impl SyntheticGenerator {
    pub fn new() -> Self {
        Self { rng: StdRng::from_os_rng() }
    }

    /// Deterministic generator for tests and reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// One cycle of traffic for the given hour of day
    pub fn generate_traffic(&mut self, hour: u32) -> [ClassReading; 6] {
        let multiplier = traffic_multiplier(hour);
        VehicleClass::ALL.map(|class| {
            let variation = self.rng.random_range(0.7..=1.3);
            let count = (base_level(class) * multiplier * variation).round() as u32;
            let avg_speed = base_speed(class) * self.rng.random_range(0.8..=1.2);
            ClassReading { class, count, avg_speed }
        })
    }

    /// An accident label with fixed low probability, otherwise nothing
    pub fn generate_accident(&mut self) -> Option<AccidentLabel> {
        if !self.rng.random_bool(ACCIDENT_PROBABILITY) {
            return None;
        }
        AccidentLabel::ALL.choose(&mut self.rng).copied()
    }

    /// Representative readings for one hour, for backfilling history
    pub fn hourly_profile(&mut self, hour: u32) -> [ClassReading; 6] {
        let multiplier = hourly_multiplier(hour);
        VehicleClass::ALL.map(|class| {
            let variation = self.rng.random_range(0.8..=1.2);
            let count = (base_level(class) * multiplier * variation).round() as u32;
            let avg_speed = base_speed(class) * self.rng.random_range(0.8..=1.2);
            ClassReading { class, count, avg_speed }
        })
    }
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new()
    }
}
