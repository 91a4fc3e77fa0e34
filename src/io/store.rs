//! Persistence gateway - the pipeline's only write path
//!
//! Appends one `traffic` row per aggregation cycle and one `accidents` row per
//! recorded accident. Rows are never updated or deleted from here; severity
//! and status belong to the incident-management surface after insert.

use crate::domain::snapshot::{AccidentRecord, TrafficSnapshot};
use crate::domain::types::VehicleClass;
use anyhow::Context;
use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SCHEMA_VERSION: i32 = 1;

/// Timestamp format shared with the dashboard's date/hour queries
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_date_time(at: &DateTime<Local>) -> String {
    at.format(DATE_TIME_FORMAT).to_string()
}

/// Durable store for snapshots and accidents
pub trait PersistenceGateway: Send {
    fn insert_traffic(&mut self, snapshot: &TrafficSnapshot) -> anyhow::Result<i64>;
    fn insert_accident(&mut self, record: &AccidentRecord) -> anyhow::Result<i64>;
}

/// SQLite-backed gateway
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and ensure the schema
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::ensure_schema(&conn)?;
        info!(path = %path.display(), "store_opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
        let schema = include_str!("../../schema.sql");
        conn.execute_batch(schema).context("Failed to apply schema")?;
        let user_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if user_version < SCHEMA_VERSION {
            conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
        }
        Ok(())
    }
}

impl PersistenceGateway for SqliteStore {
    fn insert_traffic(&mut self, snapshot: &TrafficSnapshot) -> anyhow::Result<i64> {
        let count = |c: VehicleClass| snapshot.reading(c).count as i64;
        let speed = |c: VehicleClass| snapshot.reading(c).avg_speed;
        self.conn
            .execute(
                "INSERT INTO traffic (
                    date_time,
                    pedestrian_count, bicycle_count, car_count,
                    motorcycle_count, bus_count, truck_count,
                    pedestrian_speed, bicycle_speed, car_speed,
                    motorcycle_speed, bus_speed, truck_speed,
                    volume, congestion
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    format_date_time(&snapshot.recorded_at),
                    count(VehicleClass::Person),
                    count(VehicleClass::Bicycle),
                    count(VehicleClass::Car),
                    count(VehicleClass::Motorcycle),
                    count(VehicleClass::Bus),
                    count(VehicleClass::Truck),
                    speed(VehicleClass::Person),
                    speed(VehicleClass::Bicycle),
                    speed(VehicleClass::Car),
                    speed(VehicleClass::Motorcycle),
                    speed(VehicleClass::Bus),
                    speed(VehicleClass::Truck),
                    snapshot.volume,
                    snapshot.congestion.as_i32(),
                ],
            )
            .context("Failed to insert traffic row")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_accident(&mut self, record: &AccidentRecord) -> anyhow::Result<i64> {
        self.conn
            .execute(
                "INSERT INTO accidents (date_time, img, involved, confidence, severity, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    format_date_time(&record.recorded_at),
                    record.image,
                    record.label.as_str(),
                    record.confidence as f64,
                    record.severity.as_str(),
                    record.status.as_str(),
                ],
            )
            .context("Failed to insert accident row")?;
        Ok(self.conn.last_insert_rowid())
    }
}

type Opener = Box<dyn FnMut() -> anyhow::Result<Box<dyn PersistenceGateway>> + Send>;

/// Gateway that opens its backing store on first use
///
/// A failed open is returned as that insert's error and retried on the next
/// insert, so an unavailable database costs writes rather than the pipeline.
pub struct ReopeningStore {
    open: Opener,
    inner: Option<Box<dyn PersistenceGateway>>,
    failed_opens: u64,
}

impl ReopeningStore {
    pub fn new<F>(open: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Box<dyn PersistenceGateway>> + Send + 'static,
    {
        Self { open: Box::new(open), inner: None, failed_opens: 0 }
    }

    pub fn sqlite(path: PathBuf) -> Self {
        Self::new(move || {
            let store: Box<dyn PersistenceGateway> = Box::new(SqliteStore::open(&path)?);
            Ok(store)
        })
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn store(&mut self) -> anyhow::Result<&mut Box<dyn PersistenceGateway>> {
        let store = match self.inner.take() {
            Some(store) => store,
            None => match (self.open)() {
                Ok(store) => {
                    if self.failed_opens > 0 {
                        info!(failed_opens = self.failed_opens, "store_recovered");
                    }
                    self.failed_opens = 0;
                    store
                }
                Err(e) => {
                    self.failed_opens += 1;
                    warn!(attempt = self.failed_opens, error = %format!("{e:#}"), "store_open_failed");
                    return Err(e.context("Store unavailable"));
                }
            },
        };
        Ok(self.inner.insert(store))
    }
}

impl PersistenceGateway for ReopeningStore {
    fn insert_traffic(&mut self, snapshot: &TrafficSnapshot) -> anyhow::Result<i64> {
        self.store()?.insert_traffic(snapshot)
    }

    fn insert_accident(&mut self, record: &AccidentRecord) -> anyhow::Result<i64> {
        self.store()?.insert_accident(record)
    }
}
