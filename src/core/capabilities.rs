//! Remote capabilities consumed by a session
//!
//! Transcription, chat, speech synthesis and final scoring live behind async
//! traits so the turn workflow can run against an HTTP backend or test fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::SessionError;
use crate::types::{
    EvaluationEntry, FinalScore, Level, LevelDistribution, QuestionType, TurnHistory, UserProfile,
};
use crate::PROMPT_CHAR_LIMIT;

/// Captured microphone audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Synthesized speech ready to play
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHandle {
    pub bytes: Arc<[u8]>,
    pub mime: String,
}

impl AudioHandle {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }
}

/// Control values and context for one bot turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub language: String,
    pub native_language: String,
    pub situation: String,
    pub target_level: Level,
    pub question_type: QuestionType,
    pub last_message: String,
    pub context: String,
}

impl ChatRequest {
    pub fn new(
        profile: &UserProfile,
        target_level: Level,
        question_type: QuestionType,
        last_message: impl Into<String>,
        history: &TurnHistory,
        context_entries: usize,
    ) -> Self {
        Self {
            language: profile.language.clone(),
            native_language: "Spanish".to_string(),
            situation: profile.situation.clone(),
            target_level,
            question_type,
            last_message: last_message.into(),
            context: history.context(context_entries),
        }
    }

    /// Prompt text, capped at `PROMPT_CHAR_LIMIT` characters
    pub fn render(&self) -> String {
        let prompt = format!(
            "[Turn parameters]\n\
             - Target language to speak and ask in: {}\n\
             - User's native language: {}\n\
             - Topic / situation: \"{}\"\n\
             - Current estimated CEFR level: {}\n\
             - Requested interaction type: \"{}\" ({}) - Example: \"{}\"\n\
             \n\
             [Goal]\n\
             Produce a single conversational turn that:\n\
             1) is of the requested type,\n\
             2) is adapted to the indicated level,\n\
             3) invites an answer that is useful for assessment.\n\
             \n\
             [Context]\n\
             User's last message:\n\
             \"{}\"\n\
             \n\
             Recent conversation:\n\
             {}\n\
             \n\
             Keep the conversation fluid and natural.",
            self.language,
            self.native_language,
            self.situation,
            self.target_level,
            self.question_type.tag(),
            self.question_type.description(),
            self.question_type.example(),
            self.last_message,
            self.context,
        );
        prompt.chars().take(PROMPT_CHAR_LIMIT).collect()
    }
}

/// Reply of the reasoning backend. Fields are optional so a malformed reply
/// can be detected and rejected as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default, alias = "Q")]
    pub quality: Option<f64>,
    #[serde(default, alias = "P_nueva")]
    pub distribution: Option<LevelDistribution>,
}

impl ChatReply {
    pub fn new(reply: impl Into<String>, quality: f64, distribution: LevelDistribution) -> Self {
        Self {
            reply: Some(reply.into()),
            quality: Some(quality),
            distribution: Some(distribution),
        }
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioClip) -> Result<String, SessionError>;
}

#[async_trait]
pub trait Conversant: Send + Sync {
    async fn converse(&self, request: &ChatRequest) -> Result<ChatReply, SessionError>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioHandle, SessionError>;
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(
        &self,
        history: &TurnHistory,
        raw_log: &[EvaluationEntry],
    ) -> Result<FinalScore, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SelfReportedLevel, TurnRecord};

    #[test]
    fn test_chat_reply_accepts_legacy_keys() {
        let json = r#"{"reply": "Tell me more", "Q": 0.7, "P_nueva": {"A1": 10, "A2": 20, "B1": 40, "B2": 20, "C1": 10}}"#;
        let reply: ChatReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.quality, Some(0.7));
        assert_eq!(reply.distribution.unwrap().dominant(), Level::B1);
    }

    #[test]
    fn test_chat_reply_missing_fields() {
        let reply: ChatReply = serde_json::from_str(r#"{"reply": "hi"}"#).unwrap();
        assert!(reply.distribution.is_none());
        assert!(reply.quality.is_none());
    }

    #[test]
    fn test_render_carries_control_values() {
        let profile = UserProfile::new("Ana", "English", "job interview", SelfReportedLevel::Medium);
        let mut history = TurnHistory::new();
        history.push(TurnRecord::prompt("Ready?"));
        history.record_response("Yes I am");

        let request = ChatRequest::new(&profile, Level::B1, QuestionType::Reformulation, "Yes I am", &history, 3);
        let prompt = request.render();
        assert!(prompt.contains("CEFR level: B1"));
        assert!(prompt.contains("\"reformulacion\""));
        assert!(prompt.contains("Bot: Ready?"));
        assert!(prompt.contains("User: Yes I am"));
    }

    #[test]
    fn test_render_is_capped() {
        let profile = UserProfile::new("Ana", "English", "x".repeat(5000), SelfReportedLevel::Low);
        let request = ChatRequest::new(&profile, Level::A1, QuestionType::CefrQuestion, "", &TurnHistory::new(), 3);
        assert_eq!(request.render().chars().count(), PROMPT_CHAR_LIMIT);
    }
}
