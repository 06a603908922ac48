//! Mixer configuration.

use serde::{Deserialize, Serialize};

use crate::error::MixerError;

/// Which host tick drives the mixer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackModeProcess {
    Physics,
    #[default]
    Idle,
    /// Only explicit `advance` calls run the pipeline.
    Manual,
}

/// When method-track calls are invoked.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackModeMethod {
    /// Queued in `Outputs::deferred_calls` for the host to flush once per frame.
    #[default]
    Deferred,
    /// Invoked on the scene during the apply stage, in track order.
    Immediate,
}

pub const MIN_AUDIO_POLYPHONY: usize = 1;
pub const MAX_AUDIO_POLYPHONY: usize = 128;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    pub active: bool,
    /// Skip weight renormalization; results accumulate additively from the initial value.
    pub deterministic: bool,
    /// Node path every track path is resolved against ("" or "." is the host root).
    pub root_node: String,
    pub callback_mode_process: CallbackModeProcess,
    pub callback_mode_method: CallbackModeMethod,
    /// Voices allowed per audio track before new starts are dropped.
    pub audio_max_polyphony: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            active: true,
            deterministic: false,
            root_node: String::new(),
            callback_mode_process: CallbackModeProcess::Idle,
            callback_mode_method: CallbackModeMethod::Deferred,
            audio_max_polyphony: 32,
        }
    }
}

impl MixerConfig {
    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self, MixerError> {
        let cfg: MixerConfig =
            serde_json::from_str(s).map_err(|e| MixerError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), MixerError> {
        if !(MIN_AUDIO_POLYPHONY..=MAX_AUDIO_POLYPHONY).contains(&self.audio_max_polyphony) {
            return Err(MixerError::InvalidPolyphony(self.audio_max_polyphony));
        }
        crate::mixer::parse_root(&self.root_node)?;
        Ok(())
    }
}
