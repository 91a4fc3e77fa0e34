//! Domain models - core traffic types and geometry
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - vehicle classes, accident taxonomy, frames, tracker output
//! - `region` - measurement zone and the edge-side containment test
//! - `snapshot` - per-cycle accumulator and the persisted rows

pub mod region;
pub mod snapshot;
pub mod types;

pub use region::Region;
pub use snapshot::{AccidentRecord, ClassAccumulator, CongestionLevel, TrafficSnapshot};
pub use types::{AccidentLabel, Tick, TrackId, VehicleClass};
