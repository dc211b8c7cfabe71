//! Speed trigger state machine
//!
//! Decides, once per processed fix, whether audio should start or stop:
//!
//! - `Idle` → `Active` when speed rises strictly above the threshold and an
//!   audio resource is selected.
//! - While `Active`, time spent strictly below the threshold accumulates. The
//!   counter is not reset when speed recovers; only the timeout (counter
//!   strictly greater than the grace period) or a fresh start clears it.
//! - Disabling forces `Idle` immediately and clears the counter.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::AudioSink;
use crate::error::LightspeedError;
use crate::types::{TriggerConfig, TriggerPhase, TriggerState};

/// Command the trigger issued to the sink during an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeedTrigger {
    state: TriggerState,
}

impl SpeedTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn phase(&self) -> TriggerPhase {
        self.state.phase()
    }

    /// Evaluate the current speed against `config`.
    ///
    /// A playback failure is returned as `Err(Playback)` after the trigger has
    /// already moved to `Active`. Exceeding the threshold with no resource
    /// selected returns `Err(MissingAudioResource)` and stays `Idle`.
    pub fn evaluate<S: AudioSink + ?Sized>(
        &mut self,
        speed_kmh: f64,
        elapsed_ms: i64,
        config: &TriggerConfig,
        sink: &mut S,
    ) -> Result<Option<TriggerAction>, LightspeedError> {
        if !config.enabled {
            return Ok(self.disable(sink));
        }

        if !self.state.audio_active {
            if speed_kmh <= config.threshold_kmh {
                return Ok(None);
            }

            let resource = config
                .audio_resource
                .as_ref()
                .ok_or(LightspeedError::MissingAudioResource)?;

            self.state.audio_active = true;
            self.state.millis_below_threshold = 0;
            info!(speed_kmh, threshold_kmh = config.threshold_kmh, %resource, "starting audio");

            if let Err(e) = sink.start(resource) {
                warn!(error = %e, "audio sink failed to start; trigger stays active");
                return Err(e.into());
            }
            return Ok(Some(TriggerAction::Start));
        }

        if speed_kmh < config.threshold_kmh {
            self.state.millis_below_threshold += elapsed_ms;
            debug!(
                speed_kmh,
                millis_below_threshold = self.state.millis_below_threshold,
                "below threshold while active"
            );
        }

        if self.state.millis_below_threshold > config.grace_ms {
            info!(
                millis_below_threshold = self.state.millis_below_threshold,
                grace_ms = config.grace_ms,
                "grace period elapsed, stopping audio"
            );
            self.state = TriggerState::default();
            sink.stop();
            return Ok(Some(TriggerAction::Stop));
        }

        Ok(None)
    }

    /// Force `Idle`, stopping the sink only if audio was active.
    pub fn disable<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> Option<TriggerAction> {
        let was_active = self.state.audio_active;
        self.state = TriggerState::default();

        if was_active {
            info!("audio disabled, stopping playback");
            sink.stop();
            Some(TriggerAction::Stop)
        } else {
            None
        }
    }
}
