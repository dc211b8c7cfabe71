//! Core types for the LightSpeed pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: position fixes, derived kinematics, trigger configuration and
//! state, and the rounded readout handed to the display layer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LightspeedError;

/// Standard gravity used to express acceleration in g
pub const GRAVITY_M_PER_S2: f64 = 9.81;

/// Grace period before audio is stopped once speed drops below threshold
pub const DEFAULT_GRACE_MS: i64 = 5000;

/// Number of decimals used for display values
pub const DISPLAY_DECIMALS: i32 = 2;

/// A single geographic position fix. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Timestamp on the source's monotonic clock (milliseconds)
    pub timestamp_ms: i64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp_ms,
        }
    }

    /// The equator / prime meridian origin at t=0.
    pub fn origin() -> Self {
        Self::new(0.0, 0.0, 0)
    }
}

/// Quantities derived from one ingested fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicsReading {
    /// The fix that produced this reading
    pub position: Position,
    /// Great-circle distance from the previous fix (meters)
    pub step_distance_m: f64,
    /// Time since the previous fix (milliseconds)
    pub elapsed_ms: i64,
    /// Instantaneous speed (km/h)
    pub speed_kmh: f64,
    /// Speed delta in km/h divided by elapsed milliseconds.
    ///
    /// Not an SI acceleration; displayed as `acceleration / 9.81` "g".
    pub acceleration: f64,
    /// True when the fix only seeded the state and no rates were derived
    pub seeded: bool,
}

/// Opaque reference to a user-selected audio resource (URI, path, asset id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioResource(String);

impl AudioResource {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trigger configuration, owned by the surrounding application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Speed above which audio starts (km/h). UI range is 0..=120.
    pub threshold_kmh: f64,
    /// Time below threshold tolerated before audio stops (milliseconds)
    pub grace_ms: i64,
    /// Master switch for audio playback
    pub enabled: bool,
    /// Selected audio resource, if any
    pub audio_resource: Option<AudioResource>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            threshold_kmh: 0.0,
            grace_ms: DEFAULT_GRACE_MS,
            enabled: false,
            audio_resource: None,
        }
    }
}

impl TriggerConfig {
    /// Reject configurations the trigger cannot run with.
    ///
    /// A non-positive grace period would stop audio on the first active fix.
    pub fn validate(&self) -> Result<(), LightspeedError> {
        if self.grace_ms <= 0 {
            return Err(LightspeedError::InvalidConfig(format!(
                "grace_ms must be positive, got {}",
                self.grace_ms
            )));
        }
        if !self.threshold_kmh.is_finite() || self.threshold_kmh < 0.0 {
            return Err(LightspeedError::InvalidConfig(format!(
                "threshold_kmh must be a non-negative number, got {}",
                self.threshold_kmh
            )));
        }
        Ok(())
    }
}

/// Coarse trigger phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPhase {
    #[default]
    Idle,
    Active,
}

/// Mutable trigger state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerState {
    /// Whether audio is considered playing
    pub audio_active: bool,
    /// Accumulated time below threshold while active (milliseconds)
    pub millis_below_threshold: i64,
}

impl TriggerState {
    pub fn phase(&self) -> TriggerPhase {
        if self.audio_active {
            TriggerPhase::Active
        } else {
            TriggerPhase::Idle
        }
    }
}

/// Display-ready view of the processor state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Readout {
    pub latitude: f64,
    pub longitude: f64,
    /// Speed in km/h, rounded to 2 decimals
    pub speed_kmh: f64,
    /// Step distance in meters, rounded to 2 decimals
    pub step_distance_m: f64,
    /// Acceleration divided by 9.81, rounded to 2 decimals
    pub acceleration_g: f64,
    pub trigger_phase: TriggerPhase,
    pub millis_below_threshold: i64,
}

/// Round half away from zero to the given number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let multiplier = 10f64.powi(decimals);
    (value * multiplier).round() / multiplier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(3.14159, 2), 3.14);
        assert_eq!(round_to(2.675_1, 2), 2.68);
        assert_eq!(round_to(-1.005_1, 2), -1.01);
        assert_eq!(round_to(42.0, 2), 42.0);
    }

    #[test]
    fn test_trigger_config_defaults_from_partial_json() {
        let config: TriggerConfig = serde_json::from_str(r#"{"threshold_kmh": 25.0}"#).unwrap();
        assert_eq!(config.threshold_kmh, 25.0);
        assert_eq!(config.grace_ms, DEFAULT_GRACE_MS);
        assert!(!config.enabled);
        assert!(config.audio_resource.is_none());
    }

    #[test]
    fn test_audio_resource_serializes_as_plain_string() {
        let config = TriggerConfig {
            audio_resource: Some(AudioResource::new("content://media/audio/7")),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["audio_resource"], "content://media/audio/7");
    }

    #[test]
    fn test_trigger_config_validate() {
        assert!(TriggerConfig::default().validate().is_ok());

        for grace_ms in [0, -1] {
            let config = TriggerConfig {
                grace_ms,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(LightspeedError::InvalidConfig(_))
            ));
        }

        let negative = TriggerConfig {
            threshold_kmh: -3.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_trigger_state_phase() {
        let mut state = TriggerState::default();
        assert_eq!(state.phase(), TriggerPhase::Idle);
        state.audio_active = true;
        assert_eq!(state.phase(), TriggerPhase::Active);
    }
}
