//! User profile collected during onboarding, and the final score payload

use serde::{Deserialize, Serialize};

use crate::types::SelfReportedLevel;

/// Onboarding answers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    /// Language being assessed
    pub language: String,
    /// Conversation topic / situation
    pub situation: String,
    /// Coarse self-reported level
    #[serde(default)]
    pub level: SelfReportedLevel,
}

impl UserProfile {
    pub fn new(
        name: impl Into<String>,
        language: impl Into<String>,
        situation: impl Into<String>,
        level: SelfReportedLevel,
    ) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            situation: situation.into(),
            level,
        }
    }

    /// Name, language and situation all filled in
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.language.trim().is_empty()
            && !self.situation.trim().is_empty()
    }

    /// Opening line of the session
    pub fn greeting(&self) -> String {
        format!(
            "Hi {}, welcome. We are going to talk in {} about \"{}\" to estimate your language level. Ready to start?",
            self.name, self.language, self.situation
        )
    }

    /// Spoken right before final scoring
    pub fn closing(&self) -> String {
        format!(
            "Thank you, {}. I have enough information to give you feedback on your {} level. Let me analyze your performance.",
            self.name, self.language
        )
    }
}

/// Kind of final observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    #[serde(alias = "fortaleza")]
    Strength,
    #[serde(alias = "consejo")]
    Advice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "type", alias = "tipo")]
    pub kind: ObservationKind,
    #[serde(alias = "texto")]
    pub text: String,
}

/// Result of the external scoring capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalScore {
    #[serde(alias = "nivel")]
    pub level: String,
    #[serde(default, alias = "mensaje")]
    pub message: String,
    #[serde(default, alias = "observaciones")]
    pub observations: Vec<Observation>,
}
