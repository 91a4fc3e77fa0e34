//! Hourly history for a fresh database
//!
//! Writes one synthetic snapshot per hour for the last `days` days, oldest
//! first, ending at the hour before `now`. Charts grouped by date and hour
//! then have something to show before the first live run.

use crate::domain::snapshot::{CongestionThresholds, TrafficSnapshot};
use crate::io::store::PersistenceGateway;
use crate::services::synthetic::SyntheticGenerator;
use anyhow::Context;
use chrono::{DateTime, Duration, DurationRound, Local, Timelike};
use tracing::info;

pub fn backfill(
    store: &mut dyn PersistenceGateway,
    generator: &mut SyntheticGenerator,
    thresholds: &CongestionThresholds,
    now: DateTime<Local>,
    days: u32,
) -> anyhow::Result<usize> {
    let top_of_hour = now.duration_trunc(Duration::hours(1)).context("Failed to truncate time")?;
    let hours = i64::from(days) * 24;

    for back in (1..=hours).rev() {
        let at = top_of_hour - Duration::hours(back);
        let readings = generator.hourly_profile(at.hour());
        let snapshot = TrafficSnapshot::from_readings(at, readings, thresholds);
        store
            .insert_traffic(&snapshot)
            .with_context(|| format!("Failed to backfill hour {}", at.format("%Y-%m-%d %H:00")))?;
    }

    info!(days = days, rows = hours, "backfill_complete");
    Ok(hours as usize)
}
