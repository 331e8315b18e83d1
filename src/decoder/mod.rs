//! Payload decoding for the two device kinds.
//!
//! Both payloads are positional tuples; field order and count are fixed per
//! topic:
//! - greenhouse station: `(device_id, timestamp_origin, illumination, temperature, pressure, moisture)`
//! - distance sensor: `(mac, timestamp_origin, distance)`

pub mod literal;
pub mod router;

pub use literal::{Literal, LiteralError};
pub use router::{Routed, Router, TopicKind};

use crate::error::DecodeError;
use crate::models::{DistanceReading, Reading};

/// Field count of a greenhouse station tuple
pub const READING_ARITY: usize = 6;
/// Field count of a distance sensor tuple
pub const DISTANCE_ARITY: usize = 3;

/// Largest integer magnitude an `f64` holds exactly (2^53)
const MAX_EXACT_INT: i64 = 1 << 53;

/// Decode a greenhouse station payload
///
/// # Arguments
/// * `payload` - Raw message bytes
/// * `received_at` - Receive timestamp to stamp on the reading (epoch seconds)
pub fn decode_reading(payload: &[u8], received_at: i64) -> Result<Reading, DecodeError> {
    let fields = fields(payload, READING_ARITY)?;

    Ok(Reading {
        device_id: string_field(&fields[0], "device_id")?,
        timestamp_origin: integer_field(&fields[1], "timestamp_origin")?,
        timestamp_receive: received_at,
        illumination: number_field(&fields[2], "illumination")?,
        temperature: number_field(&fields[3], "temperature")?,
        pressure: number_field(&fields[4], "pressure")?,
        moisture: number_field(&fields[5], "moisture")?,
    })
}

/// Decode a distance sensor payload
pub fn decode_distance(payload: &[u8], received_at: i64) -> Result<DistanceReading, DecodeError> {
    let fields = fields(payload, DISTANCE_ARITY)?;

    Ok(DistanceReading {
        mac: string_field(&fields[0], "mac")?,
        timestamp_origin: integer_field(&fields[1], "timestamp_origin")?,
        timestamp_receive: received_at,
        distance: number_field(&fields[2], "distance")?,
    })
}

/// Parse the payload into exactly `arity` positional fields
fn fields(payload: &[u8], arity: usize) -> Result<Vec<Literal>, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::Encoding)?;

    let value = literal::parse(text).map_err(|e| match e {
        LiteralError::Syntax { .. } => DecodeError::ShapeMismatch(e.to_string()),
        LiteralError::InvalidToken { ref token, .. } => DecodeError::TypeMismatch {
            field: "payload",
            expected: "literal",
            found: token.clone(),
        },
    })?;

    match value {
        Literal::Seq(items) if items.len() == arity => Ok(items),
        Literal::Seq(items) => Err(DecodeError::ShapeMismatch(format!(
            "expected {} fields, found {}",
            arity,
            items.len()
        ))),
        other => Err(DecodeError::ShapeMismatch(format!(
            "expected a tuple of {} fields, found {}",
            arity,
            other.type_name()
        ))),
    }
}

fn mismatch(field: &'static str, expected: &'static str, found: &Literal) -> DecodeError {
    DecodeError::TypeMismatch {
        field,
        expected,
        found: found.type_name().to_string(),
    }
}

fn string_field(value: &Literal, field: &'static str) -> Result<String, DecodeError> {
    match value {
        Literal::Str(s) => Ok(s.clone()),
        other => Err(mismatch(field, "string", other)),
    }
}

fn integer_field(value: &Literal, field: &'static str) -> Result<i64, DecodeError> {
    match value {
        Literal::Int(i) => Ok(*i),
        other => Err(mismatch(field, "integer", other)),
    }
}

fn number_field(value: &Literal, field: &'static str) -> Result<f64, DecodeError> {
    match value {
        Literal::Float(x) => Ok(*x),
        Literal::Int(i) if (-MAX_EXACT_INT..=MAX_EXACT_INT).contains(i) => Ok(*i as f64),
        Literal::Int(i) => Err(DecodeError::TypeMismatch {
            field,
            expected: "number within ±2^53",
            found: i.to_string(),
        }),
        other => Err(mismatch(field, "number", other)),
    }
}
