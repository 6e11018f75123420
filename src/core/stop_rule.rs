//! Stop rule: decide after each turn whether the assessment can end
//!
//! Checks run in a fixed order and the first match wins:
//! 1. fewer than 4 useful turns → continue
//! 2. A1/A2 dominant, confidence >= 85, >= 4 useful, >= 6 total → stop
//! 3. B1+ dominant, confidence >= 70 → stop
//! 4. >= 8 total, < 30% useful → stop
//! 5. >= 6 answers with Q < 0.2 and >= 7 total → stop
//! 6. last 5 answers all Q < 0.3 → stop
//! 7. 6 useful turns → stop
//!
//! A pure function of its inputs; no hidden state.

use crate::types::{LevelDistribution, ReasonCode};
use crate::{
    HIGH_LEVEL_CONFIDENCE, LOW_LEVEL_CONFIDENCE, LOW_QUALITY, MAX_USEFUL_TURNS, MIN_USEFUL_TURNS,
    USEFUL_QUALITY, VERY_LOW_QUALITY,
};

/// Verdict of one stop-rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopDecision {
    pub stop: bool,
    pub reason: ReasonCode,
}

impl StopDecision {
    fn stop(reason: ReasonCode) -> Self {
        Self { stop: true, reason }
    }

    fn carry_on(reason: ReasonCode) -> Self {
        Self { stop: false, reason }
    }
}

/// Early termination rule
#[derive(Debug, Default, Clone, Copy)]
pub struct StopRule;

impl StopRule {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate against the current belief and the full quality history
    ///
    /// `useful_turns` is the controller's running counter; the useful count
    /// derived from `history` is used where the tuned rule calls for it.
    pub fn evaluate(
        &self,
        distribution: &LevelDistribution,
        history: &[f64],
        useful_turns: u32,
    ) -> StopDecision {
        if useful_turns < MIN_USEFUL_TURNS {
            return StopDecision::carry_on(ReasonCode::S001_MIN_ENGAGEMENT);
        }

        let dominant = distribution.dominant();
        let confidence = distribution.get(dominant);
        let useful_count = history.iter().filter(|q| **q >= USEFUL_QUALITY).count();
        let total = history.len();
        let is_low_level = dominant.is_low();

        if useful_count >= MIN_USEFUL_TURNS as usize
            && total >= 6
            && is_low_level
            && confidence >= LOW_LEVEL_CONFIDENCE
        {
            return StopDecision::stop(ReasonCode::S002_CONFIDENT_LOW_LEVEL);
        }

        if !is_low_level && confidence >= HIGH_LEVEL_CONFIDENCE && useful_turns >= MIN_USEFUL_TURNS {
            return StopDecision::stop(ReasonCode::S002_CONFIDENT_LEVEL);
        }

        if total >= 8 && (useful_count as f64 / total as f64) < 0.3 {
            return StopDecision::stop(ReasonCode::S003_ERRATIC);
        }

        let very_low = history.iter().filter(|q| **q < VERY_LOW_QUALITY).count();
        if very_low >= 6 && total >= 7 {
            return StopDecision::stop(ReasonCode::S003_PERSISTENT_LOW_QUALITY);
        }

        if trailing_low_quality(history) >= 5 {
            return StopDecision::stop(ReasonCode::S003_CONSECUTIVE_LOW_QUALITY);
        }

        if useful_turns >= MAX_USEFUL_TURNS {
            return StopDecision::stop(ReasonCode::S004_ABSOLUTE_CAP);
        }

        StopDecision::carry_on(ReasonCode::S001_CONTINUE)
    }

    /// Shorthand for `evaluate(..).stop`
    pub fn should_stop(
        &self,
        distribution: &LevelDistribution,
        history: &[f64],
        useful_turns: u32,
    ) -> bool {
        self.evaluate(distribution, history, useful_turns).stop
    }
}

/// Run of Q < 0.3 counted back from the most recent turn
pub fn trailing_low_quality(history: &[f64]) -> usize {
    history.iter().rev().take_while(|q| **q < LOW_QUALITY).count()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(v: [u32; 5]) -> LevelDistribution {
        LevelDistribution::new(v)
    }

    #[test]
    fn test_min_engagement_blocks_everything() {
        let rule = StopRule::new();
        let certain = dist([0, 0, 0, 100, 0]);
        let awful = vec![0.0; 20];
        for useful in 0..4 {
            let d = rule.evaluate(&certain, &awful, useful);
            assert!(!d.stop);
            assert_eq!(d.reason, ReasonCode::S001_MIN_ENGAGEMENT);
        }
    }

    #[test]
    fn test_confident_low_level_needs_six_turns() {
        let rule = StopRule::new();
        let low = dist([88, 8, 2, 1, 1]);
        let five = vec![0.6; 5];
        assert!(!rule.should_stop(&low, &five, 4));

        let six = vec![0.6; 6];
        let d = rule.evaluate(&low, &six, 4);
        assert_eq!(d, StopDecision { stop: true, reason: ReasonCode::S002_CONFIDENT_LOW_LEVEL });
    }

    #[test]
    fn test_low_level_at_70_does_not_use_high_threshold() {
        let rule = StopRule::new();
        let low = dist([10, 75, 10, 3, 2]);
        assert!(!rule.should_stop(&low, &[0.6; 4], 4));
    }

    #[test]
    fn test_confident_high_level() {
        let rule = StopRule::new();
        let d = rule.evaluate(&dist([2, 3, 15, 70, 10]), &[0.6; 4], 4);
        assert_eq!(d.reason, ReasonCode::S002_CONFIDENT_LEVEL);
        assert!(!rule.should_stop(&dist([2, 3, 26, 69, 0]), &[0.6; 4], 4));
    }

    #[test]
    fn test_erratic_pattern() {
        let rule = StopRule::new();
        // 10 turns, 2 useful, no long low run at the end
        let history = [0.6, 0.4, 0.4, 0.6, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4];
        let d = rule.evaluate(&LevelDistribution::uniform(), &history, 4);
        assert_eq!(d.reason, ReasonCode::S003_ERRATIC);
    }

    #[test]
    fn test_persistent_low_quality() {
        let rule = StopRule::new();
        let history = [0.1, 0.6, 0.1, 0.6, 0.1, 0.6, 0.1, 0.6, 0.1, 0.1, 0.6];
        // 5 useful of 11, not erratic; 6 very low answers
        let d = rule.evaluate(&LevelDistribution::uniform(), &history, 4);
        assert_eq!(d.reason, ReasonCode::S003_PERSISTENT_LOW_QUALITY);
    }

    #[test]
    fn test_consecutive_low_quality() {
        let rule = StopRule::new();
        let history = [0.6, 0.6, 0.6, 0.6, 0.25, 0.25, 0.25, 0.25, 0.25];
        // 4 of 9 useful, no very low answers, 5 trailing lows
        let d = rule.evaluate(&LevelDistribution::uniform(), &history, 4);
        assert_eq!(d.reason, ReasonCode::S003_CONSECUTIVE_LOW_QUALITY);
    }

    #[test]
    fn test_absolute_cap() {
        let rule = StopRule::new();
        let d = rule.evaluate(&LevelDistribution::uniform(), &[0.6; 6], 6);
        assert_eq!(d.reason, ReasonCode::S004_ABSOLUTE_CAP);
    }

    #[test]
    fn test_continue_otherwise() {
        let rule = StopRule::new();
        let d = rule.evaluate(&LevelDistribution::uniform(), &[0.6; 5], 5);
        assert_eq!(d, StopDecision { stop: false, reason: ReasonCode::S001_CONTINUE });
    }

    #[test]
    fn test_trailing_low_quality() {
        assert_eq!(trailing_low_quality(&[]), 0);
        assert_eq!(trailing_low_quality(&[0.1, 0.5, 0.1, 0.2]), 2);
        assert_eq!(trailing_low_quality(&[0.1, 0.1, 0.29]), 3);
        assert_eq!(trailing_low_quality(&[0.1, 0.3]), 0);
    }
}
