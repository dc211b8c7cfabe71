//! Error types for LightSpeed

use thiserror::Error;

use crate::audio::PlaybackError;

/// Errors that can occur while processing position fixes.
///
/// None of these are fatal: the processor keeps running after every one of
/// them, and the public `on_position_fix` entry point only logs them.
#[derive(Debug, Error)]
pub enum LightspeedError {
    /// Zero or negative time between two fixes; speed cannot be derived.
    #[error("Degenerate interval between fixes: {elapsed_ms} ms")]
    DegenerateInterval { elapsed_ms: i64 },

    #[error("Audio playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Speed threshold exceeded but no audio resource is selected")]
    MissingAudioResource,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid position fix: {0}")]
    InvalidFix(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl LightspeedError {
    /// Stable machine-readable code, used by the CLI and FFI error reports.
    pub fn code(&self) -> &'static str {
        match self {
            LightspeedError::DegenerateInterval { .. } => "DEGENERATE_INTERVAL",
            LightspeedError::Playback(_) => "PLAYBACK_ERROR",
            LightspeedError::MissingAudioResource => "MISSING_AUDIO_RESOURCE",
            LightspeedError::InvalidConfig(_) => "INVALID_CONFIG",
            LightspeedError::InvalidFix(_) => "INVALID_FIX",
            LightspeedError::ParseError(_) => "PARSE_ERROR",
            LightspeedError::JsonError(_) => "JSON_ERROR",
        }
    }
}
