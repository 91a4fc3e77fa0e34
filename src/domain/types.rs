//! Shared types for the traffic observer

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Newtype wrapper for track IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub i64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed set of road users counted per cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Truck,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 6] = [
        VehicleClass::Person,
        VehicleClass::Bicycle,
        VehicleClass::Car,
        VehicleClass::Motorcycle,
        VehicleClass::Bus,
        VehicleClass::Truck,
    ];

    /// Map a COCO class id from the detection model
    pub fn from_coco_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(VehicleClass::Person),
            1 => Some(VehicleClass::Bicycle),
            2 => Some(VehicleClass::Car),
            3 => Some(VehicleClass::Motorcycle),
            5 => Some(VehicleClass::Bus),
            7 => Some(VehicleClass::Truck),
            _ => None,
        }
    }

    pub fn coco_id(&self) -> i64 {
        match self {
            VehicleClass::Person => 0,
            VehicleClass::Bicycle => 1,
            VehicleClass::Car => 2,
            VehicleClass::Motorcycle => 3,
            VehicleClass::Bus => 5,
            VehicleClass::Truck => 7,
        }
    }

    /// Position in `ALL`, used to index fixed-size per-class arrays
    pub fn index(&self) -> usize {
        match self {
            VehicleClass::Person => 0,
            VehicleClass::Bicycle => 1,
            VehicleClass::Car => 2,
            VehicleClass::Motorcycle => 3,
            VehicleClass::Bus => 4,
            VehicleClass::Truck => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Person => "person",
            VehicleClass::Bicycle => "bicycle",
            VehicleClass::Car => "car",
            VehicleClass::Motorcycle => "motorcycle",
            VehicleClass::Bus => "bus",
            VehicleClass::Truck => "truck",
        }
    }

    /// Column prefix in the `traffic` table (`person` is stored as pedestrian)
    pub fn column_prefix(&self) -> &'static str {
        match self {
            VehicleClass::Person => "pedestrian",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parties involved in a detected accident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccidentLabel {
    BikeBike,
    BikeObject,
    BikePedestrian,
    CarBike,
    CarCar,
    CarObject,
    CarPedestrian,
}

impl AccidentLabel {
    pub const ALL: [AccidentLabel; 7] = [
        AccidentLabel::BikeBike,
        AccidentLabel::BikeObject,
        AccidentLabel::BikePedestrian,
        AccidentLabel::CarBike,
        AccidentLabel::CarCar,
        AccidentLabel::CarObject,
        AccidentLabel::CarPedestrian,
    ];

    /// Map a class id from the accident model
    pub fn from_class_id(id: i64) -> Option<Self> {
        usize::try_from(id).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccidentLabel::BikeBike => "Bike, Bike",
            AccidentLabel::BikeObject => "Bike, Object",
            AccidentLabel::BikePedestrian => "Bike, Pedestrian",
            AccidentLabel::CarBike => "Car, Bike",
            AccidentLabel::CarCar => "Car, Car",
            AccidentLabel::CarObject => "Car, Object",
            AccidentLabel::CarPedestrian => "Car, Pedestrian",
        }
    }
}

impl std::fmt::Display for AccidentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 2D point in pixel (or fractional) frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box, corner form
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn center(&self) -> Point {
        Point::new(((self.x1 + self.x2) * 0.5) as f64, ((self.y1 + self.y2) * 0.5) as f64)
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One decoded video frame, packed BGR8
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    /// All-black frame, used for synthetic accident stills
    pub fn black(width: u32, height: u32) -> Self {
        Self { width, height, data: vec![0; width as usize * height as usize * 3] }
    }
}

/// Tracker output for a single object in a frame
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub track_id: TrackId,
    pub bbox: BBox,
    /// Raw class id as reported by the model
    pub class_id: i64,
}

/// Accident model output for a single detection in a frame
#[derive(Debug, Clone, Copy)]
pub struct AccidentDetection {
    pub confidence: f32,
    pub class_id: i64,
}

/// A candidate accident for this cycle, after class mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccidentSignal {
    pub confidence: f32,
    pub label: AccidentLabel,
}

/// The instant a cycle runs at
///
/// `wall` stamps persisted rows and drives time-of-day synthesis;
/// `monotonic` (seconds since pipeline start) drives speed and debounce math.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub wall: DateTime<Local>,
    pub monotonic: f64,
}

impl Tick {
    pub fn new(wall: DateTime<Local>, monotonic: f64) -> Self {
        Self { wall, monotonic }
    }
}
