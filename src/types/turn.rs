//! Turn model
//!
//! - TurnRecord = one exchange: bot prompt, user response, and the scores the
//!   reasoning backend attached to the bot turn
//! - TurnHistory = append-only sequence of records for one session
//! - EvaluationEntry = raw per-turn evidence kept for final scoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::LevelDistribution;

/// Interaction type requested from the reasoning backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    /// Structured question to show clear, ordered speech
    #[serde(rename = "pregunta_cefr")]
    CefrQuestion,
    /// Comprehension question about something said earlier
    #[serde(rename = "input_oral")]
    OralInput,
    /// Short everyday misunderstanding to resolve by talking
    #[serde(rename = "microconflicto")]
    MicroConflict,
    /// Practical decision the user has to justify
    #[serde(rename = "decision_pragmatica")]
    PragmaticDecision,
    /// Rephrase or improve an earlier expression
    #[serde(rename = "reformulacion")]
    Reformulation,
    /// Summarize an earlier idea and react to it
    #[serde(rename = "resumen_reaccion")]
    SummaryReaction,
}

impl QuestionType {
    /// Every type, in catalogue order
    pub const ALL: [QuestionType; 6] = [
        QuestionType::CefrQuestion,
        QuestionType::OralInput,
        QuestionType::MicroConflict,
        QuestionType::PragmaticDecision,
        QuestionType::Reformulation,
        QuestionType::SummaryReaction,
    ];

    /// Stable wire tag
    pub fn tag(&self) -> &'static str {
        match self {
            Self::CefrQuestion => "pregunta_cefr",
            Self::OralInput => "input_oral",
            Self::MicroConflict => "microconflicto",
            Self::PragmaticDecision => "decision_pragmatica",
            Self::Reformulation => "reformulacion",
            Self::SummaryReaction => "resumen_reaccion",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::CefrQuestion => {
                "A structured question that lets the user show they can speak clearly and in order."
            }
            Self::OralInput => {
                "A question based on listening comprehension or on something said earlier."
            }
            Self::MicroConflict => {
                "A brief everyday misunderstanding or problem the user must resolve by speaking."
            }
            Self::PragmaticDecision => {
                "A scenario where the user must make a practical decision and explain why."
            }
            Self::Reformulation => {
                "The user must improve, clarify or rephrase an expression they used before."
            }
            Self::SummaryReaction => {
                "The user summarizes an idea mentioned earlier and gives their opinion."
            }
        }
    }

    pub fn example(&self) -> &'static str {
        match self {
            Self::CefrQuestion => "Can you describe a typical day at your job?",
            Self::OralInput => {
                "What do you think about what I told you earlier about group interviews?"
            }
            Self::MicroConflict => {
                "Your colleague arrives late and doesn't have the instructions. How would you explain them quickly?"
            }
            Self::PragmaticDecision => {
                "You are choosing between two job offers. What factors would you consider?"
            }
            Self::Reformulation => {
                "Can you say that again using a different structure or more formal vocabulary?"
            }
            Self::SummaryReaction => "Could you summarize your view on virtual interviews?",
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One conversational exchange
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// What the bot said
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// What the user answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Interaction type of the bot prompt
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<QuestionType>,
    /// Quality of the user's previous answer, as judged with this prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    /// Accumulated distribution after this turn was applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<LevelDistribution>,
    /// When the record was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl TurnRecord {
    /// Bot prompt with no scores (greeting)
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            prompt: Some(text.into()),
            created_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// User response with no matching prompt
    pub fn response(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            created_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Scored bot turn
    pub fn scored(
        prompt: impl Into<String>,
        question_type: QuestionType,
        quality: f64,
        distribution: LevelDistribution,
    ) -> Self {
        Self {
            prompt: Some(prompt.into()),
            response: None,
            question_type: Some(question_type),
            quality: Some(quality),
            distribution: Some(distribution),
            created_at: Some(Utc::now()),
        }
    }

    /// Prompt present, response still missing
    pub fn awaits_response(&self) -> bool {
        self.prompt.is_some() && self.response.is_none()
    }

    fn has_text(field: &Option<String>) -> bool {
        field.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
    }
}

/// Append-only turn history for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnHistory {
    records: Vec<TurnRecord>,
}

impl TurnHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<TurnRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: TurnRecord) {
        self.records.push(record);
    }

    /// Attach a user response to the open prompt, or start a new record
    pub fn record_response(&mut self, text: impl Into<String>) {
        let text = text.into();
        match self.records.last_mut() {
            Some(last) if last.response.is_none() => last.response = Some(text),
            _ => self.records.push(TurnRecord::response(text)),
        }
    }

    pub fn records(&self) -> &[TurnRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TurnRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Last record has a prompt and no response yet
    pub fn awaiting_response(&self) -> bool {
        self.last().map(|r| r.awaits_response()).unwrap_or(false)
    }

    /// Type tags in order, untagged records skipped
    pub fn types(&self) -> impl Iterator<Item = QuestionType> + '_ {
        self.records.iter().filter_map(|r| r.question_type)
    }

    /// Most recent tagged type
    pub fn last_type(&self) -> Option<QuestionType> {
        self.records.iter().rev().find_map(|r| r.question_type)
    }

    /// Coverage so far: occurrences of each type
    pub fn type_counts(&self) -> HashMap<QuestionType, usize> {
        let mut counts = HashMap::new();
        for t in self.types() {
            *counts.entry(t).or_insert(0) += 1;
        }
        counts
    }

    /// `Bot: …` / `User: …` lines for the last `n` records
    pub fn context(&self, n: usize) -> String {
        let start = self.records.len().saturating_sub(n);
        self.records[start..]
            .iter()
            .map(|r| {
                let mut lines = Vec::new();
                if let Some(p) = &r.prompt {
                    lines.push(format!("Bot: {}", p));
                }
                if let Some(a) = &r.response {
                    lines.push(format!("User: {}", a));
                }
                lines.join("\n")
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Exchanges with both a non-blank prompt and response, for redisplay
    pub fn completed_exchanges(&self) -> impl Iterator<Item = &TurnRecord> {
        self.records
            .iter()
            .filter(|r| TurnRecord::has_text(&r.prompt) && TurnRecord::has_text(&r.response))
    }
}

/// Raw evidence kept per applied bot turn
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationEntry {
    pub evidence: LevelDistribution,
    pub quality: f64,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_response_fills_open_prompt() {
        let mut history = TurnHistory::new();
        history.push(TurnRecord::prompt("Hello, ready?"));
        assert!(history.awaiting_response());

        history.record_response("Yes");
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().unwrap().response.as_deref(), Some("Yes"));
        assert!(!history.awaiting_response());
    }

    #[test]
    fn test_record_response_without_prompt_appends() {
        let mut history = TurnHistory::new();
        history.record_response("Hi");
        history.record_response("Again");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_type_counts_skip_untagged() {
        let mut history = TurnHistory::new();
        history.push(TurnRecord::prompt("greeting"));
        history.push(TurnRecord::scored("q1", QuestionType::CefrQuestion, 0.6, LevelDistribution::uniform()));
        history.push(TurnRecord::scored("q2", QuestionType::OralInput, 0.6, LevelDistribution::uniform()));
        history.push(TurnRecord::scored("q3", QuestionType::CefrQuestion, 0.6, LevelDistribution::uniform()));

        let counts = history.type_counts();
        assert_eq!(counts.get(&QuestionType::CefrQuestion), Some(&2));
        assert_eq!(counts.get(&QuestionType::OralInput), Some(&1));
        assert_eq!(history.last_type(), Some(QuestionType::CefrQuestion));
    }

    #[test]
    fn test_context_uses_last_entries() {
        let mut history = TurnHistory::new();
        for i in 0..5 {
            history.push(TurnRecord::prompt(format!("q{i}")));
            history.record_response(format!("a{i}"));
        }
        let ctx = history.context(2);
        assert!(ctx.contains("Bot: q3"));
        assert!(ctx.contains("User: a4"));
        assert!(!ctx.contains("q2"));
    }

    #[test]
    fn test_wire_format_uses_type_tag() {
        let record = TurnRecord::scored("q", QuestionType::MicroConflict, 0.7, LevelDistribution::uniform());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "microconflicto");
        assert!(json.get("response").is_none());
    }

    #[test]
    fn test_completed_exchanges_skip_blank() {
        let mut history = TurnHistory::new();
        history.push(TurnRecord::prompt("q0"));
        history.record_response("   ");
        history.push(TurnRecord::prompt("q1"));
        history.record_response("real answer");
        history.push(TurnRecord::prompt("q2"));
        assert_eq!(history.completed_exchanges().count(), 1);
    }
}
