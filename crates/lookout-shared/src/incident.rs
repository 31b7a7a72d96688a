//! Incident model: classifier output and the persisted incident record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo::GeoPoint;

/// Incident category. Unrecognized strings deserialize to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum EventType {
    Accident,
    Construction,
    StalledVehicle,
    Flooding,
    PoliceActivity,
    NormalTraffic,
    Debris,
    Fire,
    SpeedSensor,
    Hazard,
    Unknown,
}

impl EventType {
    pub const ALL: [EventType; 11] = [
        EventType::Accident,
        EventType::Construction,
        EventType::StalledVehicle,
        EventType::Flooding,
        EventType::PoliceActivity,
        EventType::NormalTraffic,
        EventType::Debris,
        EventType::Fire,
        EventType::SpeedSensor,
        EventType::Hazard,
        EventType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Accident => "accident",
            EventType::Construction => "construction",
            EventType::StalledVehicle => "stalled_vehicle",
            EventType::Flooding => "flooding",
            EventType::PoliceActivity => "police_activity",
            EventType::NormalTraffic => "normal_traffic",
            EventType::Debris => "debris",
            EventType::Fire => "fire",
            EventType::SpeedSensor => "speed_sensor",
            EventType::Hazard => "hazard",
            EventType::Unknown => "unknown",
        }
    }

    /// Lenient parse: case and separators are ignored, anything else is `Unknown`.
    pub fn parse(s: &str) -> Self {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .unwrap_or(EventType::Unknown)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        EventType::parse(&s)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of classifying one camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub event_type: EventType,
    pub confidence: f64,
    pub vehicles_detected: u32,
    pub blocked_lanes: u32,
    /// Severity 1..=10
    pub rating: u8,
    pub description: String,
}

impl Classification {
    /// Clamp confidence to [0,1] and rating to [1,10].
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.rating = self.rating.clamp(1, 10);
        self
    }
}

/// Incident ready to be written; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIncident {
    pub classification: Classification,
    pub location: GeoPoint,
    pub image_path: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub clearance_minutes: Option<f64>,
    pub notification: String,
}

impl NewIncident {
    pub fn into_incident(self, id: i64) -> Incident {
        let c = self.classification;
        Incident {
            id,
            event_type: c.event_type,
            confidence: c.confidence,
            rating: c.rating,
            vehicles_detected: c.vehicles_detected,
            blocked_lanes: c.blocked_lanes,
            lat: self.location.lat,
            lon: self.location.lon,
            description: c.description,
            image_path: self.image_path,
            timestamp: self.timestamp,
            clearance_minutes: self.clearance_minutes,
            notification: self.notification,
        }
    }
}

/// A persisted incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub event_type: EventType,
    pub confidence: f64,
    pub rating: u8,
    pub vehicles_detected: u32,
    pub blocked_lanes: u32,
    pub lat: f64,
    pub lon: f64,
    pub description: String,
    pub image_path: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub clearance_minutes: Option<f64>,
    #[serde(default)]
    pub notification: String,
}

impl Incident {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}
