//! System state definitions

use serde::{Deserialize, Serialize};

/// The nine states of the voice interface. Exactly one is current at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemState {
    /// Nothing happening, microphone closed
    #[default]
    Idle,
    /// Microphone open, waiting for speech
    Listening,
    /// Speech detected, capturing audio
    Recording,
    /// Captured audio submitted for transcription
    Transcribing,
    /// Chat round-trip in flight
    Chatting,
    /// Waiting for synthesized speech
    LoadingAudio,
    /// Bot audio playing, avatar animating
    Speaking,
    /// Final scoring in flight
    ProcessingFeedback,
    /// Final score delivered
    FeedbackDone,
}

/// What the rendering layer should show for a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Presentation {
    /// Microphone indicator lit
    pub mic_active: bool,
    /// Recording pulse shown
    pub recording: bool,
    /// Avatar mouth animation running
    pub avatar_speaking: bool,
    /// Busy spinner shown
    pub busy: bool,
    /// Replay buttons on bot bubbles enabled
    pub playback_enabled: bool,
}

impl SystemState {
    /// Recording may only begin from here
    pub fn can_record(&self) -> bool {
        matches!(self, SystemState::Listening)
    }

    /// Audio output may start from these states
    pub fn can_play(&self) -> bool {
        matches!(
            self,
            SystemState::Listening
                | SystemState::Chatting
                | SystemState::LoadingAudio
                | SystemState::Speaking
        )
    }

    /// No further listening once scoring has begun
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            SystemState::ProcessingFeedback | SystemState::FeedbackDone
        )
    }

    /// Pure state-to-presentation mapping for the rendering layer
    pub fn presentation(&self) -> Presentation {
        Presentation {
            mic_active: matches!(self, SystemState::Listening | SystemState::Recording),
            recording: matches!(self, SystemState::Recording),
            avatar_speaking: matches!(self, SystemState::Speaking),
            busy: matches!(
                self,
                SystemState::Transcribing
                    | SystemState::Chatting
                    | SystemState::LoadingAudio
                    | SystemState::ProcessingFeedback
            ),
            playback_enabled: self.can_play(),
        }
    }

    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            SystemState::Idle | SystemState::FeedbackDone => "\x1b[90m", // Gray
            SystemState::Listening => "\x1b[36m",                       // Cyan
            SystemState::Recording => "\x1b[31m",                       // Red
            SystemState::Transcribing
            | SystemState::Chatting
            | SystemState::LoadingAudio
            | SystemState::ProcessingFeedback => "\x1b[33m", // Yellow
            SystemState::Speaking => "\x1b[32m",                        // Green
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }

    /// Get emoji for state
    pub fn emoji(&self) -> &'static str {
        match self {
            SystemState::Idle => "💤",
            SystemState::Listening => "👂",
            SystemState::Recording => "🎙️",
            SystemState::Transcribing => "📝",
            SystemState::Chatting => "💬",
            SystemState::LoadingAudio => "⏳",
            SystemState::Speaking => "🗣️",
            SystemState::ProcessingFeedback => "🧮",
            SystemState::FeedbackDone => "✅",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemState::Idle => "idle",
            SystemState::Listening => "listening",
            SystemState::Recording => "recording",
            SystemState::Transcribing => "transcribing",
            SystemState::Chatting => "chatting",
            SystemState::LoadingAudio => "loading-audio",
            SystemState::Speaking => "speaking",
            SystemState::ProcessingFeedback => "processing-feedback",
            SystemState::FeedbackDone => "feedback-done",
        }
    }
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
