//! lightspeed.fix.v1 schema definition
//!
//! One record per position fix as delivered by a location provider. The
//! timestamp may be given either as integer milliseconds on the source clock
//! or as an RFC 3339 instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Position;

/// Current schema version
pub const SCHEMA_VERSION: &str = "lightspeed.fix.v1";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Fix timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixTime {
    /// Milliseconds on the source's monotonic clock
    Millis(i64),
    /// Wall-clock instant (UTC)
    Instant(DateTime<Utc>),
}

impl FixTime {
    pub fn as_millis(&self) -> i64 {
        match self {
            FixTime::Millis(ms) => *ms,
            FixTime::Instant(t) => t.timestamp_millis(),
        }
    }
}

/// A single position fix record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRecord {
    /// Schema version identifier
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Optional caller-side identifier, echoed in validation reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_id: Option<String>,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Fix time
    pub timestamp: FixTime,
}

impl FixRecord {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            fix_id: None,
            latitude,
            longitude,
            timestamp: FixTime::Millis(timestamp_ms),
        }
    }

    pub fn to_position(&self) -> Position {
        Position::new(self.latitude, self.longitude, self.timestamp.as_millis())
    }

    /// Validate the record.
    ///
    /// Out-of-range but finite coordinates are accepted; sensor data is noisy
    /// and processed best effort.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }
        validate_position(&self.to_position())
    }
}

/// Boundary check shared by records, the processor and the FFI layer.
pub fn validate_position(position: &Position) -> Result<(), ValidationError> {
    if !position.latitude.is_finite() {
        return Err(ValidationError::NonFiniteCoordinate {
            field: "latitude",
            value: position.latitude,
        });
    }
    if !position.longitude.is_finite() {
        return Err(ValidationError::NonFiniteCoordinate {
            field: "longitude",
            value: position.longitude,
        });
    }
    if position.timestamp_ms < 0 {
        return Err(ValidationError::NegativeTimestamp(position.timestamp_ms));
    }
    Ok(())
}

/// Validation errors for fix records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Non-finite {field}: {value}")]
    NonFiniteCoordinate { field: &'static str, value: f64 },

    #[error("Negative timestamp: {0} ms")]
    NegativeTimestamp(i64),
}
