//! Output structures for terminal display and the API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Level, LevelDistribution, QuestionType, ReasonCode};

/// Output for each applied bot turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutput {
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Quality of the answer just scored
    pub quality: f64,
    /// Accumulated distribution after the update
    pub distribution: LevelDistribution,
    /// Dominant level after the update
    pub dominant: Level,
    /// Percentage held by the dominant level
    pub confidence: u32,
    /// Useful turns so far
    pub useful_turns: u32,
    /// Visible progress 0..100
    pub progress: u32,
    /// Interaction type of the next prompt
    pub question_type: QuestionType,
    /// Stop-rule verdict or evidence note
    pub reason: ReasonCode,
    /// Session closed by this turn
    pub finalized: bool,
}

impl TurnOutput {
    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let color = if self.finalized { "\x1b[32m" } else { "\x1b[36m" };
        format!(
            "{}Q={:.2} | {} {}% | useful={} | progress={}% | next={} | {}\x1b[0m",
            color,
            self.quality,
            self.dominant,
            self.confidence,
            self.useful_turns,
            self.progress,
            self.question_type,
            self.reason.code(),
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "Q={:.2} | dominant={} | confidence={} | useful={} | progress={} | dist={} | reason={}",
            self.quality,
            self.dominant,
            self.confidence,
            self.useful_turns,
            self.progress,
            self.distribution.to_compact_string(),
            self.reason.code()
        )
    }
}

/// Visible progress for a useful-turn count
pub fn progress(useful_turns: u32) -> u32 {
    let pct = (useful_turns as f64 / crate::MAX_USEFUL_TURNS as f64 * 100.0).round() as u32;
    pct.min(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_rounds_and_caps() {
        assert_eq!(progress(0), 0);
        assert_eq!(progress(1), 17);
        assert_eq!(progress(4), 67);
        assert_eq!(progress(6), 100);
        assert_eq!(progress(9), 100);
    }
}
