//! Telemetry and roster data model
//!
//! Field names on the wire follow the device protocol
//! (`gpsdata`, `xacc`, `heartratedata`, ...), so clients keep working
//! against the JSON produced here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single GPS fix reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsSample {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub bearing: f64,
    /// Ground speed in m/s as reported by the receiver
    pub speed: f64,
    pub accuracy: f64,
    /// Fix time (Unix milliseconds)
    pub time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccelSample {
    #[serde(rename = "xacc")]
    pub x: f64,
    #[serde(rename = "yacc")]
    pub y: f64,
    #[serde(rename = "zacc")]
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GyroSample {
    #[serde(rename = "xgyro")]
    pub x: f64,
    #[serde(rename = "ygyro")]
    pub y: f64,
    #[serde(rename = "zgyro")]
    pub z: f64,
}

/// Raw sensor telemetry for one session
///
/// Used both for an incoming batch and for the accumulated staged session.
/// Each sensor samples independently, so the four sequences may have
/// different lengths.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSession {
    #[serde(rename = "gpsdata", default)]
    pub gps: Vec<GpsSample>,
    #[serde(rename = "accdata", default)]
    pub accel: Vec<AccelSample>,
    #[serde(rename = "gyrodata", default)]
    pub gyro: Vec<GyroSample>,
    #[serde(rename = "heartratedata", default)]
    pub heart_rate: Vec<i32>,
}

impl RawSession {
    /// Suffix-concatenate every sensor sequence of `batch`
    pub fn extend_from(&mut self, batch: &RawSession) {
        self.gps.extend_from_slice(&batch.gps);
        self.accel.extend_from_slice(&batch.accel);
        self.gyro.extend_from_slice(&batch.gyro);
        self.heart_rate.extend_from_slice(&batch.heart_rate);
    }

    pub fn is_empty(&self) -> bool {
        self.gps.is_empty()
            && self.accel.is_empty()
            && self.gyro.is_empty()
            && self.heart_rate.is_empty()
    }

    /// Total number of samples across all sensors
    pub fn sample_count(&self) -> usize {
        self.gps.len() + self.accel.len() + self.gyro.len() + self.heart_rate.len()
    }
}

/// Derived metrics computed from raw batches
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedSession {
    #[serde(default)]
    pub speed: Vec<f64>,
    #[serde(default)]
    pub distance: Vec<f64>,
    #[serde(rename = "heartrate", default)]
    pub heart_rate: Vec<i32>,
}

impl DerivedSession {
    pub fn extend_from(&mut self, batch: &DerivedSession) {
        self.speed.extend_from_slice(&batch.speed);
        self.distance.extend_from_slice(&batch.distance);
        self.heart_rate.extend_from_slice(&batch.heart_rate);
    }

    pub fn is_empty(&self) -> bool {
        self.speed.is_empty() && self.distance.is_empty() && self.heart_rate.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.speed.len() + self.distance.len() + self.heart_rate.len()
    }
}

/// A persisted derived session as served back by history queries
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainRecord {
    /// Store-assigned record id, increasing in flush order
    #[serde(rename = "_id")]
    pub id: i64,
    /// Flush time (Unix seconds)
    pub timestamp: i64,
    #[serde(flatten)]
    pub metrics: DerivedSession,
}

/// Store-assigned player identity (24 hex characters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Generate a fresh identity from 12 random bytes
    pub fn generate() -> Self {
        let bytes: [u8; 12] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gender code, serialized as the integers `0` (male) and `1` (female)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl TryFrom<u8> for Gender {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Gender::Male),
            1 => Ok(Gender::Female),
            other => Err(format!("invalid gender code: {}", other)),
        }
    }
}

impl From<Gender> for u8 {
    fn from(value: Gender) -> Self {
        match value {
            Gender::Male => 0,
            Gender::Female => 1,
        }
    }
}

/// Demographic and physiological profile
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub gender: Gender,
    pub age: i32,
    pub height: f32,
    pub weight: f32,
    #[serde(rename = "heartrate")]
    pub heart_rate: i32,
    #[serde(rename = "maxheartrate")]
    pub max_heart_rate: i32,
}

impl PlayerProfile {
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && self.age > 0
            && self.height > 0.0
            && self.weight > 0.0
            && self.heart_rate > 0
            && self.max_heart_rate > 0
    }
}

/// Computed performance summary
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Remark {
    pub speed: f64,
    #[serde(rename = "heartrate")]
    pub heart_rate: i32,
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PlayerId>,
    pub name: String,
    #[serde(rename = "detailinfo")]
    pub profile: PlayerProfile,
    #[serde(rename = "overallremark", default)]
    pub remark: Remark,
    /// Opaque history blob
    #[serde(default)]
    pub history: String,
}

impl PlayerRecord {
    /// Validity rule: name and profile must be filled in; a persisted record
    /// (one carrying an id) additionally needs a history.
    pub fn is_valid(&self) -> bool {
        let base = !self.name.is_empty() && self.profile.is_valid();
        match self.id {
            None => base,
            Some(_) => base && !self.history.is_empty(),
        }
    }

    /// Compare everything except the identity
    pub fn same_content(&self, other: &PlayerRecord) -> bool {
        self.name == other.name
            && self.profile == other.profile
            && self.remark == other.remark
            && self.history == other.history
    }
}
