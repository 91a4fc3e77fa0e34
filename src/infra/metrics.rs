//! Lock-free pipeline metrics and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! `report()` swaps the periodic window to zero; `totals()` reads the
//! cumulative view served to Prometheus without resetting anything.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::snapshot::CongestionLevel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential cycle latency bucket boundaries (milliseconds)
/// Buckets: ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, ≤5120, >5120
const BUCKET_BOUNDS: [u64; 10] = [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120];
const NUM_BUCKETS: usize = 11;

/// Tier gauge values
pub const TIER_LIVE: u64 = 0;
pub const TIER_DEGRADED: u64 = 1;
pub const TIER_SYNTHETIC: u64 = 2;

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120, 10240];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Aggregation cycles run (monotonic)
    cycles_total: AtomicU64,
    /// Cycles since last report (reset on report)
    cycles_since_report: AtomicU64,
    /// Sum of cycle latencies in ms (reset on report)
    cycle_latency_sum_ms: AtomicU64,
    /// Max cycle latency in ms (reset on report)
    cycle_latency_max_ms: AtomicU64,
    /// Cycle latency histogram for the report window (reset on report)
    window_buckets: [AtomicU64; NUM_BUCKETS],
    /// Cycle latency histogram since start (monotonic)
    total_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of all cycle latencies in ms (monotonic)
    total_latency_sum_ms: AtomicU64,
    snapshots_written_total: AtomicU64,
    snapshot_write_failures_total: AtomicU64,
    accidents_recorded_total: AtomicU64,
    accident_write_failures_total: AtomicU64,
    /// Cycles where the source failed but a snapshot was still written
    cycle_faults_total: AtomicU64,
    speed_samples_total: AtomicU64,
    degradations_total: AtomicU64,
    /// Current tier (0=live, 1=degraded model only, 2=synthetic)
    tier: AtomicU64,
    /// Congestion of the last written snapshot (0=low, 1=medium, 2=high)
    last_congestion: AtomicU64,
    /// Object count of the last written snapshot
    last_object_count: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            cycles_since_report: AtomicU64::new(0),
            cycle_latency_sum_ms: AtomicU64::new(0),
            cycle_latency_max_ms: AtomicU64::new(0),
            window_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            total_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            total_latency_sum_ms: AtomicU64::new(0),
            snapshots_written_total: AtomicU64::new(0),
            snapshot_write_failures_total: AtomicU64::new(0),
            accidents_recorded_total: AtomicU64::new(0),
            accident_write_failures_total: AtomicU64::new(0),
            cycle_faults_total: AtomicU64::new(0),
            speed_samples_total: AtomicU64::new(0),
            degradations_total: AtomicU64::new(0),
            tier: AtomicU64::new(TIER_SYNTHETIC),
            last_congestion: AtomicU64::new(0),
            last_object_count: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed cycle with its wall latency
    #[inline]
    pub fn record_cycle(&self, latency_ms: u64) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.cycles_since_report.fetch_add(1, Ordering::Relaxed);
        self.cycle_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.total_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);

        let bucket = bucket_index(latency_ms);
        self.window_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.total_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.cycle_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_snapshot_written(&self, congestion: CongestionLevel, objects: u32) {
        self.snapshots_written_total.fetch_add(1, Ordering::Relaxed);
        self.last_congestion.store(congestion.as_i32() as u64, Ordering::Relaxed);
        self.last_object_count.store(objects as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_snapshot_write_failure(&self) {
        self.snapshot_write_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_accident(&self) {
        self.accidents_recorded_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_accident_write_failure(&self) {
        self.accident_write_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cycle_fault(&self) {
        self.cycle_faults_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_speed_samples(&self, n: u64) {
        self.speed_samples_total.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_degradation(&self) {
        self.degradations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Set current tier gauge (see `TIER_*`)
    #[inline]
    pub fn set_tier(&self, tier: u64) {
        self.tier.store(tier, Ordering::Relaxed);
    }

    #[inline]
    pub fn tier(&self) -> u64 {
        self.tier.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn snapshots_written_total(&self) -> u64 {
        self.snapshots_written_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn accidents_recorded_total(&self) -> u64 {
        self.accidents_recorded_total.load(Ordering::Relaxed)
    }

    /// Cumulative view for scraping. Resets nothing
    pub fn totals(&self) -> MetricsTotals {
        MetricsTotals {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycle_latency_buckets: load_buckets(&self.total_buckets),
            cycle_latency_sum_ms: self.total_latency_sum_ms.load(Ordering::Relaxed),
            snapshots_written_total: self.snapshots_written_total.load(Ordering::Relaxed),
            snapshot_write_failures_total: self
                .snapshot_write_failures_total
                .load(Ordering::Relaxed),
            accidents_recorded_total: self.accidents_recorded_total.load(Ordering::Relaxed),
            accident_write_failures_total: self
                .accident_write_failures_total
                .load(Ordering::Relaxed),
            cycle_faults_total: self.cycle_faults_total.load(Ordering::Relaxed),
            speed_samples_total: self.speed_samples_total.load(Ordering::Relaxed),
            degradations_total: self.degradations_total.load(Ordering::Relaxed),
            tier: self.tier.load(Ordering::Relaxed),
            last_congestion: self.last_congestion.load(Ordering::Relaxed),
            last_object_count: self.last_object_count.load(Ordering::Relaxed),
        }
    }

    /// Calculate the periodic summary, then reset the window counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let cycles = self.cycles_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.cycle_latency_sum_ms.swap(0, Ordering::Relaxed);
        let max_latency = self.cycle_latency_max_ms.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.window_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let cycles_per_min = if elapsed.as_secs_f64() > 0.0 {
            cycles as f64 * 60.0 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if cycles > 0 { latency_sum / cycles } else { 0 };

        MetricsSummary {
            totals: self.totals(),
            cycles_in_window: cycles,
            cycles_per_min,
            avg_cycle_latency_ms: avg_latency,
            max_cycle_latency_ms: max_latency,
            lat_p50_ms: percentile_from_buckets(&buckets, 0.50),
            lat_p95_ms: percentile_from_buckets(&buckets, 0.95),
            lat_p99_ms: percentile_from_buckets(&buckets, 0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

/// Cumulative counters and gauges
#[derive(Debug, Clone)]
pub struct MetricsTotals {
    pub cycles_total: u64,
    /// Bounds: ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, ≤5120, >5120 ms
    pub cycle_latency_buckets: [u64; NUM_BUCKETS],
    pub cycle_latency_sum_ms: u64,
    pub snapshots_written_total: u64,
    pub snapshot_write_failures_total: u64,
    pub accidents_recorded_total: u64,
    pub accident_write_failures_total: u64,
    pub cycle_faults_total: u64,
    pub speed_samples_total: u64,
    pub degradations_total: u64,
    pub tier: u64,
    pub last_congestion: u64,
    pub last_object_count: u64,
}

/// Periodic window summary for the log reporter
#[derive(Debug)]
pub struct MetricsSummary {
    pub totals: MetricsTotals,
    pub cycles_in_window: u64,
    pub cycles_per_min: f64,
    pub avg_cycle_latency_ms: u64,
    pub max_cycle_latency_ms: u64,
    pub lat_p50_ms: u64,
    pub lat_p95_ms: u64,
    pub lat_p99_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cycles_total = %self.totals.cycles_total,
            cycles_per_min = format!("{:.1}", self.cycles_per_min),
            avg_cycle_ms = %self.avg_cycle_latency_ms,
            max_cycle_ms = %self.max_cycle_latency_ms,
            p50_ms = %self.lat_p50_ms,
            p95_ms = %self.lat_p95_ms,
            p99_ms = %self.lat_p99_ms,
            snapshots = %self.totals.snapshots_written_total,
            snapshot_failures = %self.totals.snapshot_write_failures_total,
            accidents = %self.totals.accidents_recorded_total,
            faults = %self.totals.cycle_faults_total,
            tier = %self.totals.tier,
            congestion = %self.totals.last_congestion,
            "metrics"
        );
    }
}
