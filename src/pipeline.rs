//! Pipeline orchestration
//!
//! This module provides the public API for LightSpeed. A [`SpeedProcessor`]
//! is the single owner of the kinematics state, the trigger state, the
//! trigger configuration and the audio sink. Every fix flows through it in
//! arrival order:
//!
//! 1. Boundary validation - reject non-finite coordinates and negative times
//! 2. KinematicsState - derive step distance, speed and acceleration
//! 3. SpeedTrigger - compare speed to threshold and drive the audio sink
//! 4. Readout - rounded values for display

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audio::{AudioCommand, AudioSink, RecordingAudioSink};
use crate::error::LightspeedError;
use crate::kinematics::{FirstFixPolicy, KinematicsState};
use crate::schema::{validate_position, FixRecord, FixReport};
use crate::trigger::{SpeedTrigger, TriggerAction};
use crate::types::{
    round_to, AudioResource, Position, Readout, TriggerConfig, TriggerState, DISPLAY_DECIMALS,
    GRAVITY_M_PER_S2,
};

/// Processor configuration, loadable from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub trigger: TriggerConfig,
    pub first_fix: FirstFixPolicy,
}

impl ProcessorConfig {
    /// Parse and validate a configuration
    pub fn from_json(json: &str) -> Result<Self, LightspeedError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LightspeedError> {
        self.trigger.validate()
    }

    pub fn to_json(&self) -> Result<String, LightspeedError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Stateful processor for a single stream of position fixes.
pub struct SpeedProcessor<S: AudioSink = RecordingAudioSink> {
    session_id: Uuid,
    config: TriggerConfig,
    kinematics: KinematicsState,
    trigger: SpeedTrigger,
    sink: S,
    sequence: u64,
}

impl Default for SpeedProcessor<RecordingAudioSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedProcessor<RecordingAudioSink> {
    /// Create a processor with default settings and a recording sink.
    ///
    /// The recording sink keeps every audio command until it is drained with
    /// `sink_mut().take_commands()`; long-running hosts should drain it or
    /// supply their own sink through `with_sink`.
    pub fn new() -> Self {
        Self::with_config(ProcessorConfig::default())
    }

    /// Create a processor with the given configuration and a recording sink
    pub fn with_config(config: ProcessorConfig) -> Self {
        Self::with_sink(config, RecordingAudioSink::new())
    }
}

impl<S: AudioSink> SpeedProcessor<S> {
    /// Create a processor that drives `sink`
    pub fn with_sink(config: ProcessorConfig, sink: S) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            config: config.trigger,
            kinematics: KinematicsState::new(config.first_fix),
            trigger: SpeedTrigger::new(),
            sink,
            sequence: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn kinematics(&self) -> &KinematicsState {
        &self.kinematics
    }

    pub fn trigger_state(&self) -> TriggerState {
        self.trigger.state()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Number of fixes accepted so far in this session
    pub fn fixes_processed(&self) -> u64 {
        self.sequence
    }

    /// Platform entry point for a new fix. Never fails: invalid fixes are
    /// logged and dropped.
    pub fn on_position_fix(&mut self, latitude: f64, longitude: f64, timestamp_ms: i64) {
        match self.process_fix(Position::new(latitude, longitude, timestamp_ms)) {
            Ok(report) => debug!(
                sequence = report.sequence,
                speed_kmh = report.readout.speed_kmh,
                step_distance_m = report.readout.step_distance_m,
                "processed fix"
            ),
            Err(e) => warn!(error = %e, latitude, longitude, timestamp_ms, "dropping fix"),
        }
    }

    /// Process one fix and report the outcome.
    ///
    /// Only boundary validation failures are returned as errors; degenerate
    /// intervals, playback failures and a missing audio resource are recorded
    /// in the report.
    pub fn process_fix(&mut self, fix: Position) -> Result<FixReport, LightspeedError> {
        validate_position(&fix).map_err(|e| LightspeedError::InvalidFix(e.to_string()))?;

        self.sequence += 1;

        let reading = match self.kinematics.ingest_fix(fix) {
            Ok(reading) => reading,
            Err(e @ LightspeedError::DegenerateInterval { .. }) => {
                return Ok(self.report(fix, 0, None, true, Some(e)));
            }
            Err(e) => return Err(e),
        };

        if reading.seeded {
            return Ok(self.report(fix, 0, None, false, None));
        }

        let (action, error) = match self.trigger.evaluate(
            reading.speed_kmh,
            reading.elapsed_ms,
            &self.config,
            &mut self.sink,
        ) {
            Ok(action) => (action, None),
            Err(e @ LightspeedError::Playback(_)) => (Some(TriggerAction::Start), Some(e)),
            Err(e @ LightspeedError::MissingAudioResource) => {
                debug!(speed_kmh = reading.speed_kmh, "threshold exceeded without audio resource");
                (None, Some(e))
            }
            Err(e) => return Err(e),
        };

        Ok(self.report(fix, reading.elapsed_ms, action, false, error))
    }

    /// Validate a serialized record and process it.
    pub fn process_record(&mut self, record: &FixRecord) -> Result<FixReport, LightspeedError> {
        record
            .validate()
            .map_err(|e| LightspeedError::InvalidFix(e.to_string()))?;
        self.process_fix(record.to_position())
    }

    /// Process one NDJSON line. Blank lines yield `Ok(None)`.
    ///
    /// A malformed or invalid line is returned as an error and leaves the
    /// processor untouched, so streaming callers can log it and continue.
    pub fn process_line(&mut self, line: &str) -> Result<Option<FixReport>, LightspeedError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let record: FixRecord = serde_json::from_str(trimmed)
            .map_err(|e| LightspeedError::ParseError(format!("Failed to parse fix: {}", e)))?;
        self.process_record(&record).map(Some)
    }

    fn report(
        &self,
        fix: Position,
        elapsed_ms: i64,
        action: Option<TriggerAction>,
        degenerate: bool,
        error: Option<LightspeedError>,
    ) -> FixReport {
        FixReport {
            session_id: self.session_id,
            sequence: self.sequence,
            timestamp_ms: fix.timestamp_ms,
            elapsed_ms,
            readout: self.snapshot(),
            action,
            degenerate,
            error: error.map(|e| e.to_string()),
        }
    }

    /// Display-ready view of the current state
    pub fn snapshot(&self) -> Readout {
        let (latitude, longitude) = self
            .kinematics
            .last_position()
            .map(|p| (p.latitude, p.longitude))
            .unwrap_or((0.0, 0.0));
        let trigger = self.trigger.state();

        Readout {
            latitude,
            longitude,
            speed_kmh: round_to(self.kinematics.last_speed_kmh(), DISPLAY_DECIMALS),
            step_distance_m: round_to(self.kinematics.step_distance_m(), DISPLAY_DECIMALS),
            acceleration_g: round_to(
                self.kinematics.last_acceleration() / GRAVITY_M_PER_S2,
                DISPLAY_DECIMALS,
            ),
            trigger_phase: trigger.phase(),
            millis_below_threshold: trigger.millis_below_threshold,
        }
    }

    pub fn set_threshold_kmh(&mut self, threshold_kmh: f64) {
        self.config.threshold_kmh = threshold_kmh;
    }

    /// Enable or disable audio. Disabling stops active audio immediately.
    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        if !enabled {
            self.trigger.disable(&mut self.sink);
        }
    }

    pub fn select_audio_resource(&mut self, resource: Option<AudioResource>) {
        self.config.audio_resource = resource;
    }

    /// Replace the whole trigger configuration
    ///
    /// An invalid configuration is rejected and the current one is kept.
    pub fn set_config(&mut self, config: TriggerConfig) -> Result<(), LightspeedError> {
        config.validate()?;
        let enabled = config.enabled;
        self.config = config;
        if !enabled {
            self.trigger.disable(&mut self.sink);
        }
        Ok(())
    }

    /// Forget all history and stop audio if it is playing.
    pub fn reset(&mut self) {
        self.trigger.disable(&mut self.sink);
        self.kinematics.reset();
        self.sequence = 0;
    }
}

/// Result of an offline replay
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub reports: Vec<FixReport>,
    pub commands: Vec<AudioCommand>,
}

/// Replay a sequence of fixes through a fresh processor (stateless, one-shot).
///
/// Audio commands are recorded rather than played.
pub fn replay_fixes(
    fixes: &[Position],
    config: ProcessorConfig,
) -> Result<ReplayOutcome, LightspeedError> {
    let mut processor = SpeedProcessor::with_config(config);
    let reports = fixes
        .iter()
        .map(|fix| processor.process_fix(*fix))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReplayOutcome {
        reports,
        commands: processor.into_sink().take_commands(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PlaybackError;
    use crate::geo::EARTH_RADIUS_M;
    use crate::types::TriggerPhase;
    use pretty_assertions::assert_eq;

    const STEP_MS: i64 = 2000;

    fn enabled_config(first_fix: FirstFixPolicy) -> ProcessorConfig {
        ProcessorConfig {
            trigger: TriggerConfig {
                threshold_kmh: 10.0,
                enabled: true,
                audio_resource: Some(AudioResource::new("content://audio/42")),
                ..Default::default()
            },
            first_fix,
        }
    }

    /// Fixes along a meridian, 2 s apart, moving at the given speeds (km/h)
    fn fixes_at_speeds(speeds_kmh: &[f64]) -> Vec<Position> {
        let mut fixes = vec![Position::new(0.0, 0.0, 0)];
        let mut meters = 0.0;
        for (i, speed) in speeds_kmh.iter().enumerate() {
            meters += speed / 3600.0 * STEP_MS as f64;
            let latitude = (meters / EARTH_RADIUS_M).to_degrees();
            fixes.push(Position::new(latitude, 0.0, (i as i64 + 1) * STEP_MS));
        }
        fixes
    }

    #[test]
    fn test_trigger_scenario_through_processor() {
        let mut processor = SpeedProcessor::with_config(enabled_config(FirstFixPolicy::SeedOnly));
        let fixes = fixes_at_speeds(&[15.0, 15.0, 5.0, 5.0, 5.0]);

        let reports: Vec<FixReport> = fixes
            .iter()
            .map(|fix| processor.process_fix(*fix).unwrap())
            .collect();

        assert_eq!(reports[0].elapsed_ms, 0);
        assert_eq!(reports[1].action, Some(TriggerAction::Start));
        assert_eq!(reports[2].readout.trigger_phase, TriggerPhase::Active);
        assert_eq!(reports[3].readout.millis_below_threshold, 2000);
        assert_eq!(reports[4].readout.millis_below_threshold, 4000);
        assert_eq!(reports[5].action, Some(TriggerAction::Stop));
        assert_eq!(reports[5].readout.trigger_phase, TriggerPhase::Idle);
        assert_eq!(reports[5].readout.millis_below_threshold, 0);

        assert_eq!(processor.sink().start_count(), 1);
        assert_eq!(processor.sink().stop_count(), 1);

        assert_eq!(processor.sink_mut().take_commands().len(), 2);
        assert!(processor.sink().commands().is_empty());
    }

    #[test]
    fn test_disable_stops_immediately_and_reenable_is_fresh() {
        let mut processor = SpeedProcessor::with_config(enabled_config(FirstFixPolicy::SeedOnly));
        for fix in fixes_at_speeds(&[30.0, 5.0]) {
            processor.process_fix(fix).unwrap();
        }
        assert_eq!(processor.trigger_state().millis_below_threshold, 2000);

        processor.set_audio_enabled(false);
        assert_eq!(processor.trigger_state(), TriggerState::default());
        assert_eq!(processor.sink().stop_count(), 1);

        processor.set_audio_enabled(false);
        assert_eq!(processor.sink().stop_count(), 1);

        processor.set_audio_enabled(true);
        assert_eq!(processor.trigger_state().phase(), TriggerPhase::Idle);
        assert_eq!(processor.trigger_state().millis_below_threshold, 0);
    }

    #[test]
    fn test_set_config_disable_stops_once() {
        let mut processor = SpeedProcessor::with_config(enabled_config(FirstFixPolicy::SeedOnly));
        for fix in fixes_at_speeds(&[30.0]) {
            processor.process_fix(fix).unwrap();
        }
        assert_eq!(processor.trigger_state().phase(), TriggerPhase::Active);

        let disabled = TriggerConfig {
            threshold_kmh: 20.0,
            enabled: false,
            ..processor.config().clone()
        };
        processor.set_config(disabled.clone()).unwrap();

        assert_eq!(processor.config(), &disabled);
        assert_eq!(processor.trigger_state(), TriggerState::default());
        assert_eq!(processor.sink().stop_count(), 1);

        processor.set_config(disabled).unwrap();
        assert_eq!(processor.sink().stop_count(), 1);
    }

    #[test]
    fn test_set_config_rejects_non_positive_grace() {
        let config = enabled_config(FirstFixPolicy::SeedOnly);
        let mut processor = SpeedProcessor::with_config(config.clone());

        for grace_ms in [0, -1] {
            let err = processor
                .set_config(TriggerConfig {
                    grace_ms,
                    ..config.trigger.clone()
                })
                .unwrap_err();
            assert_eq!(err.code(), "INVALID_CONFIG");
        }
        assert_eq!(processor.config(), &config.trigger);
    }

    #[test]
    fn test_config_json_rejects_non_positive_grace() {
        let json = r#"{"trigger": {"threshold_kmh": 10.0, "grace_ms": -1, "enabled": true,
            "audio_resource": "content://audio/42"}}"#;
        assert!(matches!(
            ProcessorConfig::from_json(json),
            Err(LightspeedError::InvalidConfig(_))
        ));
        assert!(ProcessorConfig::from_json(r#"{"trigger": {"grace_ms": 0}}"#).is_err());
    }

    #[test]
    fn test_stream_skips_bad_lines_and_continues() {
        let mut processor = SpeedProcessor::with_config(enabled_config(FirstFixPolicy::SeedOnly));
        let lines = [
            r#"{"latitude": 0.0, "longitude": 0.0, "timestamp": 1000}"#,
            "",
            r#"{"latitude": 0.0, "longitude": 0.0, "timestamp": -5}"#,
            r#"{"latitude": 1e999, "longitude": 0.0, "timestamp": 2000}"#,
            r#"{"latitude": 0.0001, "longitude": 0.0, "timestamp": 3000}"#,
        ];

        let results: Vec<_> = lines.iter().map(|line| processor.process_line(line)).collect();

        assert_eq!(results[0].as_ref().unwrap().as_ref().unwrap().sequence, 1);
        assert!(results[1].as_ref().unwrap().is_none());
        assert_eq!(results[2].as_ref().unwrap_err().code(), "INVALID_FIX");
        assert_eq!(results[3].as_ref().unwrap_err().code(), "PARSE_ERROR");

        let last = results[4].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(last.sequence, 2);
        assert_eq!(last.elapsed_ms, 2000);
        assert!(last.readout.speed_kmh > 10.0);
        assert_eq!(last.action, Some(TriggerAction::Start));
        assert_eq!(processor.fixes_processed(), 2);
    }

    #[test]
    fn test_degenerate_fix_is_reported_not_fatal() {
        let mut processor = SpeedProcessor::with_config(enabled_config(FirstFixPolicy::SeedOnly));
        let fixes = fixes_at_speeds(&[15.0]);
        processor.process_fix(fixes[0]).unwrap();
        let moving = processor.process_fix(fixes[1]).unwrap();

        let duplicate = processor
            .process_fix(Position::new(1.0, 1.0, fixes[1].timestamp_ms))
            .unwrap();

        assert!(duplicate.degenerate);
        assert_eq!(duplicate.action, None);
        assert!(duplicate.error.unwrap().contains("Degenerate"));
        assert_eq!(duplicate.readout, moving.readout);
        assert_eq!(processor.kinematics().last_position(), Some(&fixes[1]));
    }

    #[test]
    fn test_invalid_fix_is_dropped() {
        let mut processor = SpeedProcessor::new();
        processor.on_position_fix(f64::NAN, 0.0, 1000);
        processor.on_position_fix(0.0, 0.0, -1);

        assert_eq!(processor.fixes_processed(), 0);
        assert!(processor.kinematics().last_position().is_none());
        assert!(matches!(
            processor.process_fix(Position::new(0.0, f64::INFINITY, 1)),
            Err(LightspeedError::InvalidFix(_))
        ));
    }

    #[test]
    fn test_missing_resource_is_reported() {
        let mut config = enabled_config(FirstFixPolicy::SeedOnly);
        config.trigger.audio_resource = None;
        let mut processor = SpeedProcessor::with_config(config);

        let fixes = fixes_at_speeds(&[40.0]);
        processor.process_fix(fixes[0]).unwrap();
        let report = processor.process_fix(fixes[1]).unwrap();

        assert_eq!(report.action, None);
        assert_eq!(report.readout.trigger_phase, TriggerPhase::Idle);
        assert!(report.error.is_some());
        assert!(processor.sink().commands().is_empty());
    }

    #[test]
    fn test_playback_failure_is_reported_and_active() {
        let sink = RecordingAudioSink::failing_with(PlaybackError::ResourceUnavailable(
            "content://audio/42".into(),
        ));
        let mut processor = SpeedProcessor::with_sink(enabled_config(FirstFixPolicy::SeedOnly), sink);

        let fixes = fixes_at_speeds(&[40.0]);
        processor.process_fix(fixes[0]).unwrap();
        let report = processor.process_fix(fixes[1]).unwrap();

        assert_eq!(report.action, Some(TriggerAction::Start));
        assert_eq!(report.readout.trigger_phase, TriggerPhase::Active);
        assert!(report.error.unwrap().contains("unavailable"));
    }

    #[test]
    fn test_snapshot_rounds_display_values() {
        let mut processor = SpeedProcessor::with_config(ProcessorConfig {
            first_fix: FirstFixPolicy::SeedOnly,
            ..Default::default()
        });
        processor.on_position_fix(0.0, 0.0, 0);
        processor.on_position_fix((100.0 / EARTH_RADIUS_M).to_degrees(), 0.0, 1000);

        let readout = processor.snapshot();
        assert_eq!(readout.speed_kmh, 360.0);
        assert_eq!(readout.step_distance_m, 100.0);
        // 0.36 / 9.81
        assert_eq!(readout.acceleration_g, 0.04);
    }

    #[test]
    fn test_first_fix_from_origin_spike() {
        let mut processor = SpeedProcessor::new();
        let report = processor.process_fix(Position::new(0.0, 1.0, 1000)).unwrap();

        assert!(!report.degenerate);
        assert!(report.readout.step_distance_m > 111_000.0);
        assert_eq!(report.elapsed_ms, 1000);
    }

    #[test]
    fn test_reset_stops_audio_and_clears_history() {
        let mut processor = SpeedProcessor::with_config(enabled_config(FirstFixPolicy::SeedOnly));
        for fix in fixes_at_speeds(&[30.0]) {
            processor.process_fix(fix).unwrap();
        }
        let session = processor.session_id();

        processor.reset();

        assert_eq!(processor.sink().stop_count(), 1);
        assert_eq!(processor.fixes_processed(), 0);
        assert!(processor.kinematics().last_position().is_none());
        assert_eq!(processor.session_id(), session);
    }

    #[test]
    fn test_replay_fixes() {
        let fixes = fixes_at_speeds(&[15.0, 15.0, 5.0, 5.0, 5.0]);
        let outcome = replay_fixes(&fixes, enabled_config(FirstFixPolicy::SeedOnly)).unwrap();

        assert_eq!(outcome.reports.len(), 6);
        assert_eq!(
            outcome.commands,
            vec![
                AudioCommand::Start {
                    resource: AudioResource::new("content://audio/42")
                },
                AudioCommand::Stop,
            ]
        );
    }

    #[test]
    fn test_config_json() {
        let config = ProcessorConfig::from_json(
            r#"{"trigger": {"threshold_kmh": 30.0, "enabled": true}, "first_fix": "seed_only"}"#,
        )
        .unwrap();
        assert_eq!(config.trigger.threshold_kmh, 30.0);
        assert_eq!(config.trigger.grace_ms, 5000);
        assert_eq!(config.first_fix, FirstFixPolicy::SeedOnly);

        let roundtrip = ProcessorConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(roundtrip, config);

        assert_eq!(ProcessorConfig::from_json("{}").unwrap(), ProcessorConfig::default());
        assert!(ProcessorConfig::from_json("not json").is_err());
    }
}
