//! Belief engine: Bayesian-style update of the CEFR level distribution
//!
//! Each turn the reasoning backend returns an evidence distribution and a
//! quality score Q. The evidence is sharpened by a temperature that drops as
//! Q and the prior/evidence gap grow, weighted by an effective sample size,
//! and blended into a decaying Dirichlet-like prior:
//!
//! ```text
//! gap  = |mean(evidence) - mean(prior)| / 4
//! tau  = clamp(1 - 0.35(Q - 0.5) - 0.25(gap - 0.3), 0.7, 1.3)
//! ESS  = clamp(base + 10Q + 10gap, 4, 24)         base = 2 first turn, else 6
//! post = normalize((1 - FORGET) * PRIOR_STRENGTH * prior + ESS * evidence^(1/tau))
//! ```
//!
//! The posterior is converted back to integer percentages with largest
//! remainder rounding so it always sums to exactly 100.

use crate::config::SessionConfig;
use crate::types::{EvaluationEntry, Level, LevelDistribution};
use crate::{
    ESS_BASE, ESS_BASE_FIRST_TURN, ESS_MAX, ESS_MIN, FORGET, PRIOR_STRENGTH, PROBABILITY_FLOOR,
    QUALITY_DISCARD_BELOW, TAU_MAX, TAU_MIN,
};

/// Belief update engine. Pure and deterministic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeliefEngine {
    forget: f64,
    prior_strength: f64,
}

impl Default for BeliefEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BeliefEngine {
    /// Create engine with the tuned constants
    pub fn new() -> Self {
        Self {
            forget: FORGET,
            prior_strength: PRIOR_STRENGTH,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            forget: config.forget,
            prior_strength: config.prior_strength,
        }
    }

    /// Combine `prior` with per-turn `evidence` of the given `quality`
    pub fn update(
        &self,
        prior: &LevelDistribution,
        evidence: &LevelDistribution,
        quality: f64,
        first_turn: bool,
    ) -> LevelDistribution {
        // NaN falls through here too
        if !(quality >= QUALITY_DISCARD_BELOW) {
            return *prior;
        }
        let quality = quality.min(1.0);

        let prev = prior.fractions();
        let evid = evidence.fractions();

        let gap = (mean_level(&evid) - mean_level(&prev)).abs() / 4.0;
        let tau = temperature(quality, gap);
        let sharp = sharpen(&evid, tau);
        let ess = effective_sample_size(quality, gap, first_turn);

        let prior_mass = (1.0 - self.forget) * self.prior_strength;
        let mut post = [0.0; 5];
        for i in 0..5 {
            post[i] = prior_mass * prev[i] + ess * sharp[i];
        }

        to_percentages(&normalize(&post))
    }
}

/// Expected ordinal level (1..5) of a fractional distribution
pub fn mean_level(fractions: &[f64; 5]) -> f64 {
    Level::ALL
        .iter()
        .map(|l| fractions[l.index()] * l.weight())
        .sum()
}

/// Sharpening temperature; lower means a more peaked evidence distribution
pub fn temperature(quality: f64, gap: f64) -> f64 {
    (1.0 - 0.35 * (quality - 0.5) - 0.25 * (gap - 0.3)).clamp(TAU_MIN, TAU_MAX)
}

/// Weight of the new evidence relative to the accumulated prior
pub fn effective_sample_size(quality: f64, gap: f64, first_turn: bool) -> f64 {
    let base = if first_turn { ESS_BASE_FIRST_TURN } else { ESS_BASE };
    (base + 10.0 * quality + 10.0 * gap).clamp(ESS_MIN, ESS_MAX)
}

/// Power transform `p^(1/tau)`, renormalized; zeros get a tiny floor
fn sharpen(fractions: &[f64; 5], tau: f64) -> [f64; 5] {
    let mut out = [0.0; 5];
    for (o, p) in out.iter_mut().zip(fractions.iter()) {
        let p = if *p > 0.0 { *p } else { PROBABILITY_FLOOR };
        *o = p.powf(1.0 / tau);
    }
    normalize(&out)
}

/// Scale to sum 1; an all-zero input becomes uniform
fn normalize(values: &[f64; 5]) -> [f64; 5] {
    let sum: f64 = values.iter().sum();
    if !(sum > 0.0) || !sum.is_finite() {
        return [0.2; 5];
    }
    let mut out = [0.0; 5];
    for (o, v) in out.iter_mut().zip(values.iter()) {
        *o = v / sum;
    }
    out
}

/// Largest-remainder conversion of fractions to integer percentages
///
/// Floors every scaled value, then hands the missing units to the largest
/// fractional remainders (ties by canonical order). Excess units, which only
/// floating point drift can produce, come off the largest floored value.
pub fn to_percentages(fractions: &[f64; 5]) -> LevelDistribution {
    let mut scaled = [0.0; 5];
    for (s, f) in scaled.iter_mut().zip(fractions.iter()) {
        *s = if f.is_finite() && *f > 0.0 { f * 100.0 } else { 0.0 };
    }

    let mut floors = [0u32; 5];
    for (fl, s) in floors.iter_mut().zip(scaled.iter()) {
        *fl = s.floor() as u32;
    }
    let mut total: u32 = floors.iter().sum();

    // Stable sort keeps canonical order among equal remainders
    let mut order: Vec<usize> = (0..5).collect();
    order.sort_by(|&a, &b| {
        let ra = scaled[a] - floors[a] as f64;
        let rb = scaled[b] - floors[b] as f64;
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut i = 0;
    while total < 100 {
        floors[order[i % 5]] += 1;
        total += 1;
        i += 1;
    }

    while total > 100 {
        let mut j = 0;
        for k in 1..5 {
            if floors[k] > floors[j] {
                j = k;
            }
        }
        floors[j] -= 1;
        total -= 1;
    }

    LevelDistribution::new(floors)
}

/// Weight of one raw evaluation entry in the summary distribution
pub fn evidence_weight(quality: f64, evidence: &LevelDistribution) -> f64 {
    let base = 0.5 + 1.5 * quality;
    // Strong low-level evidence counts even when the answer was weak
    if evidence.low_mass() >= 70 && quality < 0.5 {
        base + 1.0
    } else {
        base
    }
}

/// Quality-weighted average of every raw evidence distribution in a session
///
/// Rounds each level to the nearest integer and gives the residual to the
/// largest level (last one on ties). An empty log yields uniform.
pub fn summary_distribution(log: &[EvaluationEntry]) -> LevelDistribution {
    let mut acc = [0.0; 5];
    for entry in log {
        let w = evidence_weight(entry.quality, &entry.evidence);
        for level in Level::ALL {
            acc[level.index()] += entry.evidence.get(level) as f64 / 100.0 * w;
        }
    }

    let sum: f64 = acc.iter().sum();
    if !(sum > 0.0) {
        return LevelDistribution::uniform();
    }

    let mut rounded = [0i64; 5];
    for (r, a) in rounded.iter_mut().zip(acc.iter()) {
        *r = (a / sum * 100.0).round() as i64;
    }

    let diff = 100 - rounded.iter().sum::<i64>();
    if diff != 0 {
        let mut max = 0;
        for k in 1..5 {
            if rounded[k] >= rounded[max] {
                max = k;
            }
        }
        rounded[max] += diff;
    }

    let mut out = [0u32; 5];
    for (o, r) in out.iter_mut().zip(rounded.iter()) {
        *o = (*r).max(0) as u32;
    }
    LevelDistribution::new(out)
}

// =============================================================================
// TESTS
// =============================================================================
