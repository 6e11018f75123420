//! Playback controller: the single audio output slot
//!
//! Starting playback tears down whatever was playing before, along with its
//! lip-sync loop. Synthesized audio is cached by exact text.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::capabilities::{AudioHandle, Synthesizer};
use crate::core::state_store::StateStore;
use crate::error::SessionError;
use crate::types::SystemState;

/// Output device
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play to completion
    async fn play(&self, audio: &AudioHandle) -> Result<(), SessionError>;
    /// Halt immediately
    fn stop(&self);
}

/// Lip-synced avatar
pub trait Avatar: Send + Sync {
    fn play_visemes(&self, text: &str);
    fn stop(&self);
}

pub struct PlaybackController {
    synthesizer: Arc<dyn Synthesizer>,
    output: Arc<dyn AudioOutput>,
    avatar: Option<Arc<dyn Avatar>>,
    cache: HashMap<String, AudioHandle>,
    playing: bool,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("cached", &self.cache.len())
            .field("playing", &self.playing)
            .finish()
    }
}

impl PlaybackController {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            synthesizer,
            output,
            avatar: None,
            cache: HashMap::new(),
            playing: false,
        }
    }

    pub fn with_avatar(mut self, avatar: Arc<dyn Avatar>) -> Self {
        self.avatar = Some(avatar);
        self
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_cached(&self, text: &str) -> bool {
        self.cache.contains_key(text)
    }

    /// Synthesize (or reuse) and play `text`; resolves when playback ends.
    /// The state is left at `speaking`.
    pub async fn speak(&mut self, text: &str, state: &mut StateStore) -> Result<(), SessionError> {
        let from = state.get();
        if !from.can_play() {
            warn!(state = %from, "playback rejected");
            return Err(SessionError::InvalidTransition {
                from,
                operation: "start playback",
            });
        }
        self.stop();

        let audio = match self.cache.get(text) {
            Some(audio) => audio.clone(),
            None => {
                state.set(SystemState::LoadingAudio);
                let audio = self.synthesizer.synthesize(text).await?;
                self.cache.insert(text.to_string(), audio.clone());
                audio
            }
        };

        state.set(SystemState::Speaking);
        if let Some(avatar) = &self.avatar {
            avatar.play_visemes(text);
        }
        self.playing = true;
        let result = self.output.play(&audio).await;
        self.playing = false;
        if let Some(avatar) = &self.avatar {
            avatar.stop();
        }
        debug!(chars = text.len(), "playback finished");
        result
    }

    /// Halt playback and the lip-sync loop
    pub fn stop(&mut self) {
        if self.playing {
            self.output.stop();
            if let Some(avatar) = &self.avatar {
                avatar.stop();
            }
            self.playing = false;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
