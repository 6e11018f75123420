//! Integration tests for the stop rule
//!
//! Walks quality histories turn by turn, the way the controller feeds them.

use levelbot::core::StopRule;
use levelbot::types::{LevelDistribution, ReasonCode};
use levelbot::USEFUL_QUALITY;

/// First stop along a quality sequence: (turn, reason)
fn first_stop(distribution: &LevelDistribution, qualities: &[f64]) -> Option<(usize, ReasonCode)> {
    let rule = StopRule::new();
    let mut history = Vec::new();
    let mut useful = 0;
    for (i, q) in qualities.iter().enumerate() {
        history.push(*q);
        if *q >= USEFUL_QUALITY {
            useful += 1;
        }
        let decision = rule.evaluate(distribution, &history, useful);
        if decision.stop {
            return Some((i + 1, decision.reason));
        }
    }
    None
}

#[test]
fn test_steady_good_answers_hit_cap() {
    let flat = LevelDistribution::new([10, 20, 40, 20, 10]);
    assert_eq!(
        first_stop(&flat, &[0.7; 10]),
        Some((6, ReasonCode::S004_ABSOLUTE_CAP))
    );
}

#[test]
fn test_poor_answers_alone_never_stop() {
    // Never reaches four useful turns, so nothing can fire
    let flat = LevelDistribution::uniform();
    assert_eq!(first_stop(&flat, &[0.1; 30]), None);
}

#[test]
fn test_trailing_low_run_stops_once_engaged() {
    let flat = LevelDistribution::uniform();
    let mut qualities = vec![0.6; 4];
    qualities.extend([0.25; 5]);
    assert_eq!(
        first_stop(&flat, &qualities),
        Some((9, ReasonCode::S003_CONSECUTIVE_LOW_QUALITY))
    );
}

#[test]
fn test_erratic_session() {
    let flat = LevelDistribution::uniform();
    let qualities = [
        0.6, 0.6, 0.6, 0.6, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4, 0.4,
    ];
    // 4 useful of 14 is below 30%
    assert_eq!(
        first_stop(&flat, &qualities),
        Some((14, ReasonCode::S003_ERRATIC))
    );
}

#[test]
fn test_confident_level_preempts_cap() {
    let confident = LevelDistribution::new([2, 3, 10, 75, 10]);
    assert_eq!(
        first_stop(&confident, &[0.9; 10]),
        Some((4, ReasonCode::S002_CONFIDENT_LEVEL))
    );
}

#[test]
fn test_stop_reasons_are_stop_codes() {
    for reason in [
        ReasonCode::S002_CONFIDENT_LOW_LEVEL,
        ReasonCode::S002_CONFIDENT_LEVEL,
        ReasonCode::S003_ERRATIC,
        ReasonCode::S003_PERSISTENT_LOW_QUALITY,
        ReasonCode::S003_CONSECUTIVE_LOW_QUALITY,
        ReasonCode::S004_ABSOLUTE_CAP,
    ] {
        assert!(reason.is_stop(), "{}", reason.code());
    }
    assert!(!ReasonCode::S001_CONTINUE.is_stop());
    assert!(!ReasonCode::S005_LATE_RESPONSE.is_stop());
}
