//! Prometheus metrics HTTP endpoint
//!
//! Exposes pipeline metrics in Prometheus text format at /metrics and a
//! liveness check at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsTotals, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with cumulative buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let totals = metrics.totals();
    let mut output = String::with_capacity(4096);

    write_cycle_metrics(&mut output, site_id, &totals);
    write_persistence_metrics(&mut output, site_id, &totals);
    write_source_metrics(&mut output, site_id, &totals);

    output
}

fn write_cycle_metrics(output: &mut String, site: &str, totals: &MetricsTotals) {
    write_metric(
        output,
        "traffic_cycles_total",
        "Aggregation cycles run",
        MetricType::Counter,
        site,
        totals.cycles_total,
    );
    write_histogram(
        output,
        "traffic_cycle_latency_ms",
        "Aggregation cycle latency in milliseconds",
        site,
        &totals.cycle_latency_buckets,
        &METRICS_BUCKET_BOUNDS,
        totals.cycle_latency_sum_ms,
    );
    write_metric(
        output,
        "traffic_cycle_faults_total",
        "Cycles where the data source failed",
        MetricType::Counter,
        site,
        totals.cycle_faults_total,
    );
    write_metric(
        output,
        "traffic_speed_samples_total",
        "Speed samples taken from region exits",
        MetricType::Counter,
        site,
        totals.speed_samples_total,
    );
}

fn write_persistence_metrics(output: &mut String, site: &str, totals: &MetricsTotals) {
    write_metric(
        output,
        "traffic_snapshots_written_total",
        "Traffic snapshots persisted",
        MetricType::Counter,
        site,
        totals.snapshots_written_total,
    );
    write_metric(
        output,
        "traffic_snapshot_write_failures_total",
        "Traffic snapshot writes that failed",
        MetricType::Counter,
        site,
        totals.snapshot_write_failures_total,
    );
    write_metric(
        output,
        "traffic_accidents_recorded_total",
        "Accident records persisted",
        MetricType::Counter,
        site,
        totals.accidents_recorded_total,
    );
    write_metric(
        output,
        "traffic_accident_write_failures_total",
        "Accident record writes that failed",
        MetricType::Counter,
        site,
        totals.accident_write_failures_total,
    );
    write_metric(
        output,
        "traffic_congestion_level",
        "Congestion of the last snapshot (0=low, 1=medium, 2=high)",
        MetricType::Gauge,
        site,
        totals.last_congestion,
    );
    write_metric(
        output,
        "traffic_objects_last_cycle",
        "Objects counted in the last snapshot",
        MetricType::Gauge,
        site,
        totals.last_object_count,
    );
}

fn write_source_metrics(output: &mut String, site: &str, totals: &MetricsTotals) {
    write_metric(
        output,
        "traffic_source_tier",
        "Active data tier (0=live, 1=degraded model only, 2=synthetic)",
        MetricType::Gauge,
        site,
        totals.tier,
    );
    write_metric(
        output,
        "traffic_degradations_total",
        "Runtime fallbacks to synthetic data",
        MetricType::Counter,
        site,
        totals.degradations_total,
    );
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &site_id);
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
        }
        (&Method::GET, "/health") => {
            Response::builder().status(StatusCode::OK).body(Full::new(Bytes::from("ok")))
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found"))),
    };
    Ok(response.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
