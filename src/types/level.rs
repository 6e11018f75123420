//! CEFR levels and self-reported level buckets

use serde::{Deserialize, Serialize};

/// The five CEFR levels tracked by the session, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    A1,
    A2,
    B1,
    B2,
    C1,
}

impl Level {
    /// Canonical order A1..C1
    pub const ALL: [Level; 5] = [Level::A1, Level::A2, Level::B1, Level::B2, Level::C1];

    /// Position in canonical order (0..5)
    pub fn index(self) -> usize {
        self as usize
    }

    /// Ordinal weight 1..5 used for the mean level
    pub fn weight(self) -> f64 {
        (self.index() + 1) as f64
    }

    /// A1 and A2
    pub fn is_low(self) -> bool {
        matches!(self, Level::A1 | Level::A2)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::A1 => "A1",
            Level::A2 => "A2",
            Level::B1 => "B1",
            Level::B2 => "B2",
            Level::C1 => "C1",
        }
    }

    /// Parse "A1".."C1", case-insensitive
    pub fn parse(s: &str) -> Option<Level> {
        Level::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse level the user picks during onboarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfReportedLevel {
    #[serde(alias = "bajo")]
    Low,
    #[serde(alias = "medio")]
    Medium,
    #[serde(alias = "alto")]
    High,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl SelfReportedLevel {
    /// Lenient parse; anything unknown is unspecified
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" | "bajo" => Self::Low,
            "medium" | "medio" => Self::Medium,
            "high" | "alto" => Self::High,
            _ => Self::Unspecified,
        }
    }
}

impl std::fmt::Display for SelfReportedLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unspecified => "unspecified",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_are_ordinal() {
        let weights: Vec<f64> = Level::ALL.iter().map(|l| l.weight()).collect();
        assert_eq!(weights, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(Level::parse("b2"), Some(Level::B2));
        assert_eq!(Level::parse("C2"), None);
    }

    #[test]
    fn test_self_reported_accepts_legacy_spellings() {
        assert_eq!(SelfReportedLevel::parse("Bajo"), SelfReportedLevel::Low);
        assert_eq!(SelfReportedLevel::parse("alto"), SelfReportedLevel::High);
        assert_eq!(SelfReportedLevel::parse("fluent"), SelfReportedLevel::Unspecified);

        let parsed: SelfReportedLevel = serde_json::from_str("\"medio\"").unwrap();
        assert_eq!(parsed, SelfReportedLevel::Medium);
        let parsed: SelfReportedLevel = serde_json::from_str("\"whatever\"").unwrap();
        assert_eq!(parsed, SelfReportedLevel::Unspecified);
    }
}
