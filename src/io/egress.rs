//! Observation egress - mirrors persisted rows to a JSONL file
//!
//! Snapshots and accidents are written in JSONL format (one JSON object per
//! line) to the file specified in config. The image blob is not mirrored.

use crate::domain::snapshot::{AccidentRecord, TrafficSnapshot};
use crate::io::store::format_date_time;
use serde_json::{json, Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for snapshots and accidents
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a snapshot line. Returns true if successful
    pub fn write_snapshot(&self, snapshot: &TrafficSnapshot) -> bool {
        let mut classes = Map::new();
        for reading in &snapshot.readings {
            classes.insert(
                reading.class.as_str().to_string(),
                json!({ "count": reading.count, "speed": reading.avg_speed }),
            );
        }
        let line = json!({
            "kind": "traffic",
            "date_time": format_date_time(&snapshot.recorded_at),
            "classes": Value::Object(classes),
            "volume": snapshot.volume,
            "congestion": snapshot.congestion.as_i32(),
        });

        match self.append_line(&line.to_string()) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "snapshot_egress_failed");
                false
            }
        }
    }

    /// Write an accident line. Returns true if successful
    pub fn write_accident(&self, record: &AccidentRecord) -> bool {
        let line = json!({
            "kind": "accident",
            "date_time": format_date_time(&record.recorded_at),
            "involved": record.label.as_str(),
            "confidence": record.confidence,
            "severity": record.severity.as_str(),
            "status": record.status.as_str(),
            "image_bytes": record.image.len(),
        });

        match self.append_line(&line.to_string()) {
            Ok(()) => {
                info!(involved = %record.label, "accident_egressed");
                true
            }
            Err(e) => {
                error!(involved = %record.label, error = %e, "accident_egress_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}
