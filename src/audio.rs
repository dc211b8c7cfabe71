//! Audio sink boundary
//!
//! The core never manages playback itself. It issues start/stop commands to an
//! [`AudioSink`] supplied by the host and treats them as fire-and-forget.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::AudioResource;

/// Failure reported by a sink when playback cannot begin
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("Audio resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Host-provided playback controller.
///
/// Implementations must tolerate repeated calls: `stop` is idempotent, and a
/// `start` issued while a previous start is still pending should replace it.
pub trait AudioSink {
    /// Begin playing `resource`.
    fn start(&mut self, resource: &AudioResource) -> Result<(), PlaybackError>;

    /// Stop playback. Never fails.
    fn stop(&mut self);
}

/// A command issued to a sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AudioCommand {
    Start { resource: AudioResource },
    Stop,
}

/// Sink that records every command instead of playing anything.
///
/// Used for offline replays and tests. Can be told to fail on start.
/// Commands accumulate until drained with [`RecordingAudioSink::take_commands`].
#[derive(Debug, Default, Clone)]
pub struct RecordingAudioSink {
    commands: Vec<AudioCommand>,
    fail_start: Option<PlaybackError>,
}

impl RecordingAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `start` call fail with `error`.
    pub fn failing_with(error: PlaybackError) -> Self {
        Self {
            commands: Vec::new(),
            fail_start: Some(error),
        }
    }

    pub fn commands(&self) -> &[AudioCommand] {
        &self.commands
    }

    pub fn start_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, AudioCommand::Start { .. }))
            .count()
    }

    pub fn stop_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, AudioCommand::Stop))
            .count()
    }

    /// Drain recorded commands
    pub fn take_commands(&mut self) -> Vec<AudioCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl AudioSink for RecordingAudioSink {
    fn start(&mut self, resource: &AudioResource) -> Result<(), PlaybackError> {
        self.commands.push(AudioCommand::Start {
            resource: resource.clone(),
        });
        match &self.fail_start {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn stop(&mut self) {
        self.commands.push(AudioCommand::Stop);
    }
}
