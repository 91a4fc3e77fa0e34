//! Aggregation cycle and the pipeline's run loop
//!
//! Every `cycle_secs` the pipeline:
//! 1. Pulls this cycle's observations from the active data source
//! 2. Evaluates accident candidates against the confidence threshold and debounce
//! 3. Finalizes per-class averages into a snapshot
//! 4. Writes the snapshot, even when every count is zero
//! 5. Resets the accumulator
//!
//! A fatal source error swaps in a synthetic source for the rest of the run.
//! Nothing raised inside a cycle escapes the loop.

#[cfg(test)]
mod tests;

use crate::domain::snapshot::{
    AccidentRecord, ClassAccumulator, CongestionThresholds, TrafficSnapshot,
};
use crate::domain::types::{AccidentSignal, Tick};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::egress::Egress;
use crate::io::store::PersistenceGateway;
use crate::services::accident::AccidentDetector;
use crate::services::source::{DataSource, SourceError, SyntheticSource, Tier};
use chrono::Local;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Outcome of one aggregation cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Tier that produced this cycle's data
    pub tier: Tier,
    pub snapshot: TrafficSnapshot,
    pub accident: Option<AccidentSignal>,
    /// Source failure caught this cycle, if any
    pub fault: Option<SourceError>,
    /// The source was replaced by a synthetic one during this cycle
    pub degraded: bool,
    pub snapshot_persisted: bool,
}

/// The traffic observation pipeline
pub struct Pipeline {
    source: Box<dyn DataSource>,
    store: Box<dyn PersistenceGateway>,
    egress: Option<Egress>,
    detector: AccidentDetector,
    accumulator: ClassAccumulator,
    thresholds: CongestionThresholds,
    metrics: Arc<Metrics>,
    seed: Option<u64>,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        source: Box<dyn DataSource>,
        store: Box<dyn PersistenceGateway>,
        metrics: Arc<Metrics>,
    ) -> Self {
        metrics.set_tier(source.tier().gauge());
        Self {
            source,
            store,
            egress: config.egress_file().map(Egress::new),
            detector: AccidentDetector::new(config.accident_confidence(), config.debounce_secs()),
            accumulator: ClassAccumulator::new(),
            thresholds: *config.congestion(),
            metrics,
            seed: config.seed(),
        }
    }

    pub fn with_egress(mut self, egress: Egress) -> Self {
        self.egress = Some(egress);
        self
    }

    pub fn tier(&self) -> Tier {
        self.source.tier()
    }

    /// Run one aggregation cycle at `tick`
    pub fn run_cycle(&mut self, tick: &Tick) -> CycleReport {
        let started = Instant::now();
        let tier = self.source.tier();
        let mut fault = None;
        let mut degraded = false;

        match self.source.next_observations(tick) {
            Ok(observations) => {
                let samples = observations.fold_into(&mut self.accumulator);
                self.metrics.record_speed_samples(samples);
            }
            Err(e) => {
                self.metrics.record_cycle_fault();
                if e.is_fatal() {
                    self.degrade(&e.to_string());
                    degraded = true;
                } else {
                    warn!(tier = %tier, error = %e, "cycle_fault");
                }
                fault = Some(e);
            }
        }

        // The detector runs every cycle so the debounce re-arms without detections
        let candidate = if degraded { None } else { self.accident_candidate(tick) };
        let accident = self.detector.evaluate(candidate, tick.monotonic);
        if let Some(signal) = accident {
            self.record_accident(tick, signal);
        }

        let snapshot =
            TrafficSnapshot::from_readings(tick.wall, self.accumulator.finalize(), &self.thresholds);
        let snapshot_persisted = self.persist_snapshot(&snapshot);
        self.accumulator.reset();

        self.metrics.record_cycle(started.elapsed().as_millis() as u64);
        CycleReport { tier, snapshot, accident, fault, degraded, snapshot_persisted }
    }

    /// Run a cycle, containing any panic raised by a collaborator
    ///
    /// A panicking source is treated like a fatal one. The cycle still
    /// produces a zeroed snapshot; a store that panics on that write only
    /// loses the row.
    pub fn run_cycle_guarded(&mut self, tick: &Tick) -> CycleReport {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle(tick))) {
            Ok(report) => report,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(reason = %reason, "cycle_panicked");
                let tier = self.source.tier();
                self.metrics.record_cycle_fault();
                self.accumulator.reset();
                self.degrade(&format!("panic: {reason}"));

                let snapshot = TrafficSnapshot::from_readings(
                    tick.wall,
                    self.accumulator.finalize(),
                    &self.thresholds,
                );
                let snapshot_persisted =
                    panic::catch_unwind(AssertUnwindSafe(|| self.persist_snapshot(&snapshot)))
                        .unwrap_or_else(|payload| {
                            self.metrics.record_snapshot_write_failure();
                            error!(
                                reason = %panic_message(payload.as_ref()),
                                "snapshot_write_panicked"
                            );
                            false
                        });
                CycleReport {
                    tier,
                    snapshot,
                    accident: None,
                    fault: None,
                    degraded: true,
                    snapshot_persisted,
                }
            }
        }
    }

    fn accident_candidate(&mut self, tick: &Tick) -> Option<AccidentSignal> {
        match self.source.next_accident_signal(tick) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(tier = %self.source.tier(), error = %e, "accident_signal_failed");
                None
            }
        }
    }

    /// Replace the source with a synthetic one; never promotes back
    fn degrade(&mut self, reason: &str) {
        let from = self.source.tier();
        if from == Tier::Synthetic {
            warn!(reason = %reason, "synthetic_source_fault");
            return;
        }
        self.source = Box::new(SyntheticSource::from_seed(Tier::Synthetic, self.seed));
        self.metrics.record_degradation();
        self.metrics.set_tier(Tier::Synthetic.gauge());
        warn!(from = %from, to = %Tier::Synthetic, reason = %reason, "source_degraded");
    }

    fn record_accident(&mut self, tick: &Tick, signal: AccidentSignal) {
        let record = AccidentRecord::new(
            tick.wall,
            signal.label,
            signal.confidence,
            self.source.capture_image(),
        );
        match self.store.insert_accident(&record) {
            Ok(id) => {
                self.metrics.record_accident();
                info!(
                    id = %id,
                    label = %signal.label,
                    confidence = %signal.confidence,
                    image_bytes = record.image.len(),
                    "accident_recorded"
                );
                if let Some(egress) = &self.egress {
                    egress.write_accident(&record);
                }
            }
            Err(e) => {
                self.metrics.record_accident_write_failure();
                error!(label = %signal.label, error = %format!("{e:#}"), "accident_write_failed");
            }
        }
    }

    fn persist_snapshot(&mut self, snapshot: &TrafficSnapshot) -> bool {
        match self.store.insert_traffic(snapshot) {
            Ok(id) => {
                self.metrics.record_snapshot_written(snapshot.congestion, snapshot.total_count());
                debug!(
                    id = %id,
                    objects = snapshot.total_count(),
                    volume = %format!("{:.1}", snapshot.volume),
                    congestion = %snapshot.congestion.as_str(),
                    "snapshot_written"
                );
                if let Some(egress) = &self.egress {
                    egress.write_snapshot(snapshot);
                }
                true
            }
            Err(e) => {
                self.metrics.record_snapshot_write_failure();
                error!(error = %format!("{e:#}"), "snapshot_write_failed");
                false
            }
        }
    }

    /// Run cycles until shutdown is signalled
    pub async fn run(mut self, cycle: Duration, mut shutdown: watch::Receiver<bool>) {
        let started = Instant::now();
        let mut cycle_interval = interval(cycle);
        cycle_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tier = %self.tier(), cycle_ms = cycle.as_millis() as u64, "pipeline_started");

        loop {
            tokio::select! {
                _ = cycle_interval.tick() => {
                    let tick = Tick::new(Local::now(), started.elapsed().as_secs_f64());
                    let report = self.run_cycle_guarded(&tick);
                    debug!(
                        tier = %report.tier,
                        objects = report.snapshot.total_count(),
                        congestion = %report.snapshot.congestion.as_str(),
                        "cycle_complete"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("pipeline_stopped");
                        return;
                    }
                }
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Ensures the pipeline starts at most once
pub struct StartGuard {
    started: AtomicBool,
}

impl StartGuard {
    pub const fn new() -> Self {
        Self { started: AtomicBool::new(false) }
    }

    /// True exactly once
    pub fn try_claim(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    /// Let a later start try again
    pub fn release(&self) {
        self.started.store(false, Ordering::SeqCst);
    }
}

impl Default for StartGuard {
    fn default() -> Self {
        Self::new()
    }
}

static PIPELINE_STARTED: StartGuard = StartGuard::new();

/// Start the process-wide pipeline on its own thread
///
/// Returns `None` if it was already started. `build` runs on the pipeline
/// thread, so slow startup (model loads, opening the stream) never blocks
/// the caller.
pub fn spawn_once<F>(
    build: F,
    cycle: Duration,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Option<JoinHandle<()>>>
where
    F: FnOnce() -> anyhow::Result<Pipeline> + Send + 'static,
{
    spawn_guarded(&PIPELINE_STARTED, build, cycle, shutdown)
}

/// Like `spawn_once` but against `guard`
///
/// A failed or panicking build releases the guard, so a later start can
/// retry.
pub fn spawn_guarded<F>(
    guard: &'static StartGuard,
    build: F,
    cycle: Duration,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Option<JoinHandle<()>>>
where
    F: FnOnce() -> anyhow::Result<Pipeline> + Send + 'static,
{
    if !guard.try_claim() {
        warn!("pipeline_already_started");
        return Ok(None);
    }

    let handle = thread::Builder::new().name("traffic-pipeline".to_string()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "pipeline_runtime_failed");
                guard.release();
                return;
            }
        };
        let pipeline = match panic::catch_unwind(AssertUnwindSafe(build)) {
            Ok(Ok(pipeline)) => pipeline,
            Ok(Err(e)) => {
                error!(error = %format!("{e:#}"), "pipeline_build_failed");
                guard.release();
                return;
            }
            Err(payload) => {
                error!(reason = %panic_message(payload.as_ref()), "pipeline_build_panicked");
                guard.release();
                return;
            }
        };
        runtime.block_on(pipeline.run(cycle, shutdown));
    });
    let handle = handle.inspect_err(|_| guard.release())?;

    Ok(Some(handle))
}
