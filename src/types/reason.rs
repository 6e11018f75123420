//! Reason codes for turn outcomes and stop decisions

use serde::{Deserialize, Serialize};

/// Reason codes for every turn outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ReasonCode {
    // =========================================================================
    // S001: Continue
    // =========================================================================
    /// Fewer than 4 useful turns, stopping is not allowed yet
    S001_MIN_ENGAGEMENT,
    /// No stop criterion met
    S001_CONTINUE,

    // =========================================================================
    // S002: Confident read
    // =========================================================================
    /// A1/A2 dominant at >= 85 with enough evidence
    S002_CONFIDENT_LOW_LEVEL,
    /// B1+ dominant at >= 70
    S002_CONFIDENT_LEVEL,

    // =========================================================================
    // S003: Unproductive pattern
    // =========================================================================
    /// Many turns, fewer than 30% useful
    S003_ERRATIC,
    /// At least six very low quality turns
    S003_PERSISTENT_LOW_QUALITY,
    /// Five low quality turns in a row
    S003_CONSECUTIVE_LOW_QUALITY,

    // =========================================================================
    // S004: Cap
    // =========================================================================
    /// Six useful turns reached
    S004_ABSOLUTE_CAP,

    // =========================================================================
    // S005: Evidence handling
    // =========================================================================
    /// Evidence discarded, quality below 0.15
    S005_EVIDENCE_DISCARDED,
    /// Reply missing required fields, turn aborted
    S005_MALFORMED_RESPONSE,
    /// Response arrived after the session closed
    S005_LATE_RESPONSE,
}

impl ReasonCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::S001_MIN_ENGAGEMENT => "S001_MIN_ENGAGEMENT",
            Self::S001_CONTINUE => "S001_CONTINUE",
            Self::S002_CONFIDENT_LOW_LEVEL => "S002_CONFIDENT_LOW_LEVEL",
            Self::S002_CONFIDENT_LEVEL => "S002_CONFIDENT_LEVEL",
            Self::S003_ERRATIC => "S003_ERRATIC",
            Self::S003_PERSISTENT_LOW_QUALITY => "S003_PERSISTENT_LOW_QUALITY",
            Self::S003_CONSECUTIVE_LOW_QUALITY => "S003_CONSECUTIVE_LOW_QUALITY",
            Self::S004_ABSOLUTE_CAP => "S004_ABSOLUTE_CAP",
            Self::S005_EVIDENCE_DISCARDED => "S005_EVIDENCE_DISCARDED",
            Self::S005_MALFORMED_RESPONSE => "S005_MALFORMED_RESPONSE",
            Self::S005_LATE_RESPONSE => "S005_LATE_RESPONSE",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::S001_MIN_ENGAGEMENT => "Not enough useful turns yet",
            Self::S001_CONTINUE => "Continuing assessment",
            Self::S002_CONFIDENT_LOW_LEVEL => "Confident low-level read",
            Self::S002_CONFIDENT_LEVEL => "Confident level read",
            Self::S003_ERRATIC => "Too few useful answers",
            Self::S003_PERSISTENT_LOW_QUALITY => "Persistently low quality answers",
            Self::S003_CONSECUTIVE_LOW_QUALITY => "Five low quality answers in a row",
            Self::S004_ABSOLUTE_CAP => "Maximum useful turns reached",
            Self::S005_EVIDENCE_DISCARDED => "Evidence too weak, belief unchanged",
            Self::S005_MALFORMED_RESPONSE => "Reply missing fields, turn aborted",
            Self::S005_LATE_RESPONSE => "Response after close ignored",
        }
    }

    /// Whether this reason ends the assessment
    pub fn is_stop(&self) -> bool {
        matches!(
            self,
            Self::S002_CONFIDENT_LOW_LEVEL
                | Self::S002_CONFIDENT_LEVEL
                | Self::S003_ERRATIC
                | Self::S003_PERSISTENT_LOW_QUALITY
                | Self::S003_CONSECUTIVE_LOW_QUALITY
                | Self::S004_ABSOLUTE_CAP
        )
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
