//! Session configuration
//!
//! Every field has a default; a JSON file may override any subset.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SessionError;
use crate::types::SelfReportedLevel;
use crate::{
    FORGET, HISTORY_CONTEXT_ENTRIES, LOW_LEVEL_SILENCE_MS, MAX_RECORDING_MS, PRIOR_STRENGTH,
    SILENCE_MS, VAD_RMS_THRESHOLD,
};

/// Tunables for one placement session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// RMS speech threshold
    pub vad_threshold: f32,
    /// Silence budget (ms)
    pub silence_ms: u64,
    /// Silence budget for low self-reported level (ms)
    pub low_level_silence_ms: u64,
    /// Hard recording cap (ms)
    pub max_recording_ms: u64,
    /// Prior decay per turn
    pub forget: f64,
    /// Prior pseudo-count mass
    pub prior_strength: f64,
    /// Pass the first-turn flag into the belief update
    pub thread_first_turn: bool,
    /// Base URL of the chat/transcribe/tts/evaluate backend
    pub backend_url: String,
    /// History entries quoted in each chat request
    pub history_context: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vad_threshold: VAD_RMS_THRESHOLD,
            silence_ms: SILENCE_MS,
            low_level_silence_ms: LOW_LEVEL_SILENCE_MS,
            max_recording_ms: MAX_RECORDING_MS,
            forget: FORGET,
            prior_strength: PRIOR_STRENGTH,
            thread_first_turn: false,
            backend_url: "http://127.0.0.1:5000".to_string(),
            history_context: HISTORY_CONTEXT_ENTRIES,
        }
    }
}

impl SessionConfig {
    /// Load from a JSON file, falling back to defaults for missing fields
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engines cannot work with
    pub fn validate(&self) -> Result<(), SessionError> {
        if !(0.0..1.0).contains(&self.forget) {
            return Err(SessionError::Config(format!(
                "forget must be in [0, 1), got {}",
                self.forget
            )));
        }
        if self.prior_strength <= 0.0 {
            return Err(SessionError::Config(format!(
                "prior_strength must be positive, got {}",
                self.prior_strength
            )));
        }
        if self.vad_threshold <= 0.0 {
            return Err(SessionError::Config(format!(
                "vad_threshold must be positive, got {}",
                self.vad_threshold
            )));
        }
        Ok(())
    }

    /// Silence budget for a user's self-reported level
    pub fn silence_budget_ms(&self, level: SelfReportedLevel) -> u64 {
        match level {
            SelfReportedLevel::Low => self.low_level_silence_ms,
            _ => self.silence_ms,
        }
    }
}
