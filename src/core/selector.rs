//! Question-type selector: coverage-constrained adaptive sampling
//!
//! The dominant level gates which interaction types may be asked. Types that
//! have not met their per-level minimum are preferred; once coverage is met a
//! random allowed type other than the previous one is picked.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{Level, LevelDistribution, QuestionType, TurnHistory};

use QuestionType::*;

/// Scenario types counted against the "extra" requirement
pub const EXTRA_TYPES: [QuestionType; 2] = [MicroConflict, PragmaticDecision];

/// Minimum coverage for one level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    /// Per-type minimum counts, in priority order
    pub required: &'static [(QuestionType, usize)],
    /// Extra scenario requirement (0 = none)
    pub extra: usize,
}

/// Coverage table keyed by level
pub fn coverage(level: Level) -> Coverage {
    match level {
        Level::A1 => Coverage {
            required: &[(CefrQuestion, 3)],
            extra: 0,
        },
        Level::A2 => Coverage {
            required: &[(CefrQuestion, 3), (OralInput, 1)],
            extra: 1,
        },
        Level::B1 | Level::B2 | Level::C1 => Coverage {
            required: &[(CefrQuestion, 3), (OralInput, 1)],
            extra: 2,
        },
    }
}

/// Types allowed at a level, in catalogue order
pub fn allowed_types(level: Level) -> &'static [QuestionType] {
    match level {
        Level::A1 => &[CefrQuestion],
        Level::A2 => &[CefrQuestion, OralInput],
        Level::B1 | Level::B2 => &[
            CefrQuestion,
            OralInput,
            MicroConflict,
            PragmaticDecision,
            Reformulation,
        ],
        Level::C1 => &[
            CefrQuestion,
            OralInput,
            MicroConflict,
            PragmaticDecision,
            Reformulation,
            SummaryReaction,
        ],
    }
}

/// Adaptive next-question-type selector
#[derive(Debug, Default, Clone, Copy)]
pub struct QuestionTypeSelector;

impl QuestionTypeSelector {
    pub fn new() -> Self {
        Self
    }

    /// Candidate pool for the next turn; never empty
    pub fn candidates(
        &self,
        distribution: &LevelDistribution,
        history: &TurnHistory,
    ) -> Vec<QuestionType> {
        let level = distribution.dominant();
        let cov = coverage(level);
        let allowed = allowed_types(level);
        let counts = history.type_counts();
        let count = |t: &QuestionType| counts.get(t).copied().unwrap_or(0);

        let mut pool: Vec<QuestionType> = cov
            .required
            .iter()
            .filter(|&&(t, min)| allowed.contains(&t) && count(&t) < min)
            .map(|&(t, _)| t)
            .collect();

        if pool.is_empty() && cov.extra > 0 {
            if let Some(t) = EXTRA_TYPES
                .iter()
                .find(|t| count(*t) == 0 && allowed.contains(*t))
            {
                pool.push(*t);
            }
        }

        if pool.is_empty() {
            let last = history.last_type();
            pool = allowed
                .iter()
                .copied()
                .filter(|t| Some(*t) != last)
                .collect();
        }

        // Single allowed type that was also the last one
        if pool.is_empty() {
            pool = allowed.to_vec();
        }

        pool
    }

    /// Pick the next interaction type uniformly from the candidate pool
    pub fn select<R: Rng + ?Sized>(
        &self,
        distribution: &LevelDistribution,
        history: &TurnHistory,
        rng: &mut R,
    ) -> QuestionType {
        let pool = self.candidates(distribution, history);
        *pool.choose(rng).unwrap_or(&CefrQuestion)
    }
}

// =============================================================================
// TESTS
// =============================================================================
