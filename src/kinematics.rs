//! Kinematics derivation
//!
//! Consumes position fixes one at a time and derives step distance, speed and
//! acceleration from the previous fix. No smoothing is applied: every value is
//! computed from exactly two consecutive fixes.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LightspeedError;
use crate::geo::haversine_distance;
use crate::types::{KinematicsReading, Position};

/// How the very first fix is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstFixPolicy {
    /// Measure the first fix against (0.0, 0.0) at t=0. Produces a large
    /// initial distance and speed spike.
    #[default]
    FromOrigin,
    /// Use the first fix only to seed the state; it reports zero distance,
    /// speed and acceleration.
    SeedOnly,
}

/// Speed in km/h from a distance in meters covered in `elapsed_ms`.
///
/// Meters per millisecond scaled by 3600.
pub fn speed_kmh(distance_m: f64, elapsed_ms: i64) -> f64 {
    (distance_m / elapsed_ms as f64) * 3600.0
}

/// Running kinematics state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicsState {
    last_position: Option<Position>,
    last_speed_kmh: f64,
    last_acceleration: f64,
    step_distance_m: f64,
    first_fix: FirstFixPolicy,
}

impl Default for KinematicsState {
    fn default() -> Self {
        Self::new(FirstFixPolicy::default())
    }
}

impl KinematicsState {
    pub fn new(first_fix: FirstFixPolicy) -> Self {
        Self {
            last_position: None,
            last_speed_kmh: 0.0,
            last_acceleration: 0.0,
            step_distance_m: 0.0,
            first_fix,
        }
    }

    pub fn last_position(&self) -> Option<&Position> {
        self.last_position.as_ref()
    }

    pub fn last_speed_kmh(&self) -> f64 {
        self.last_speed_kmh
    }

    pub fn last_acceleration(&self) -> f64 {
        self.last_acceleration
    }

    /// Distance covered by the most recent step (not a running total)
    pub fn step_distance_m(&self) -> f64 {
        self.step_distance_m
    }

    pub fn first_fix_policy(&self) -> FirstFixPolicy {
        self.first_fix
    }

    /// Forget all history, keeping the first-fix policy.
    pub fn reset(&mut self) {
        *self = Self::new(self.first_fix);
    }

    /// Ingest a new fix and derive distance, speed and acceleration.
    ///
    /// Returns `DegenerateInterval` without touching the state when the fix is
    /// not strictly later than the previous one.
    pub fn ingest_fix(&mut self, fix: Position) -> Result<KinematicsReading, LightspeedError> {
        let previous = match (self.last_position, self.first_fix) {
            (Some(previous), _) => previous,
            (None, FirstFixPolicy::FromOrigin) => Position::origin(),
            (None, FirstFixPolicy::SeedOnly) => {
                self.last_position = Some(fix);
                self.last_speed_kmh = 0.0;
                self.last_acceleration = 0.0;
                self.step_distance_m = 0.0;
                debug!(timestamp_ms = fix.timestamp_ms, "seeded kinematics from first fix");
                return Ok(KinematicsReading {
                    position: fix,
                    step_distance_m: 0.0,
                    elapsed_ms: 0,
                    speed_kmh: 0.0,
                    acceleration: 0.0,
                    seeded: true,
                });
            }
        };

        let elapsed_ms = fix.timestamp_ms - previous.timestamp_ms;
        if elapsed_ms <= 0 {
            warn!(elapsed_ms, timestamp_ms = fix.timestamp_ms, "skipping fix with degenerate interval");
            return Err(LightspeedError::DegenerateInterval { elapsed_ms });
        }

        let step_distance_m = haversine_distance(&previous, &fix);
        let speed = speed_kmh(step_distance_m, elapsed_ms);
        let acceleration = (speed - self.last_speed_kmh) / elapsed_ms as f64;

        self.last_position = Some(fix);
        self.last_speed_kmh = speed;
        self.last_acceleration = acceleration;
        self.step_distance_m = step_distance_m;

        Ok(KinematicsReading {
            position: fix,
            step_distance_m,
            elapsed_ms,
            speed_kmh: speed,
            acceleration,
            seeded: false,
        })
    }
}
