//! LightSpeed - position-fix kinematics and speed-gated audio trigger
//!
//! LightSpeed turns a stream of periodic GPS fixes into instantaneous speed,
//! acceleration and step distance, and decides when a host audio player should
//! start or stop: fix → kinematics → speed trigger → audio sink.
//!
//! ## Modules
//!
//! - **geo**: Haversine great-circle distance
//! - **kinematics**: Per-fix distance, speed and acceleration derivation
//! - **trigger**: Threshold state machine with a grace period
//! - **pipeline**: `SpeedProcessor`, the single owner of all mutable state

pub mod audio;
pub mod error;
pub mod geo;
pub mod kinematics;
pub mod pipeline;
pub mod schema;
pub mod trigger;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use audio::{AudioSink, PlaybackError, RecordingAudioSink};
pub use error::LightspeedError;
pub use geo::haversine_distance;
pub use kinematics::{FirstFixPolicy, KinematicsState};
pub use pipeline::{replay_fixes, ProcessorConfig, SpeedProcessor};
pub use trigger::{SpeedTrigger, TriggerAction};
pub use types::{Position, Readout, TriggerConfig, TriggerState};

// Schema exports
pub use schema::{FixRecord, FixRecordAdapter, FixReport, SCHEMA_VERSION};

/// LightSpeed version embedded in CLI and FFI reports
pub const LIGHTSPEED_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "lightspeed-core";
