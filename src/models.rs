use serde::Serialize;
use time::OffsetDateTime;

/// One transmission from a greenhouse station (light, temperature, pressure, soil moisture).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub device_id: String,
    pub timestamp_origin: i64,
    pub timestamp_receive: i64,
    pub illumination: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub moisture: f64,
}

impl Reading {
    /// Device clock time of the transmission, in UTC
    pub fn origin_datetime(&self) -> Result<OffsetDateTime, time::error::ComponentRange> {
        OffsetDateTime::from_unix_timestamp(self.timestamp_origin)
    }

    /// Ingestion time of the transmission, in UTC
    pub fn receive_datetime(&self) -> Result<OffsetDateTime, time::error::ComponentRange> {
        OffsetDateTime::from_unix_timestamp(self.timestamp_receive)
    }

    pub fn illumination_level(&self) -> IlluminationLevel {
        IlluminationLevel::from_raw(self.illumination)
    }

    /// Render the decoded fields back into the tuple literal the device sent
    ///
    /// The receive timestamp is not part of the device tuple and is left out.
    pub fn to_tuple_literal(&self) -> String {
        format!(
            "({}, {}, {:?}, {:?}, {:?}, {:?})",
            quote(&self.device_id),
            self.timestamp_origin,
            self.illumination,
            self.temperature,
            self.pressure,
            self.moisture
        )
    }
}

/// One transmission from a distance sensor. Keyed by MAC, not device id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceReading {
    pub mac: String,
    pub timestamp_origin: i64,
    pub timestamp_receive: i64,
    pub distance: f64,
}

/// A decoded message, ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transmission {
    Reading(Reading),
    Distance(DistanceReading),
}

impl Transmission {
    /// Identifier of the sending device (device id or MAC)
    pub fn device(&self) -> &str {
        match self {
            Transmission::Reading(r) => &r.device_id,
            Transmission::Distance(d) => &d.mac,
        }
    }

    pub fn timestamp_origin(&self) -> i64 {
        match self {
            Transmission::Reading(r) => r.timestamp_origin,
            Transmission::Distance(d) => d.timestamp_origin,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Transmission::Reading(_) => RecordKind::Reading,
            Transmission::Distance(_) => RecordKind::Distance,
        }
    }
}

/// Which of the two disjoint record shapes a record has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Reading,
    Distance,
}

/// Store-assigned record identifier
pub type RecordId = i64;

/// A persisted transmission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: RecordId,
    pub transmission: Transmission,
}

/// Coarse brightness class of a raw LDR value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IlluminationLevel {
    Dark,
    Dim,
    Light,
    Bright,
    VeryBright,
}

impl IlluminationLevel {
    pub fn from_raw(value: f64) -> Self {
        if value < 40.0 {
            IlluminationLevel::Dark
        } else if value < 800.0 {
            IlluminationLevel::Dim
        } else if value < 2000.0 {
            IlluminationLevel::Light
        } else if value < 3200.0 {
            IlluminationLevel::Bright
        } else {
            IlluminationLevel::VeryBright
        }
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}
