//! Levelbot: adaptive spoken-language placement interview
//!
//! Voice turn → transcription → chat round-trip → belief update → stop rule →
//! next question or final scoring.

pub mod config;
pub mod core;
pub mod error;
pub mod types;

pub use config::SessionConfig;
pub use error::SessionError;

// =============================================================================
// BELIEF UPDATE [C] - tuned values, do not change without re-validating
// =============================================================================

/// Below this quality the evidence carries no information and is dropped
pub const QUALITY_DISCARD_BELOW: f64 = 0.15;

/// Soft forgetting of the accumulated prior per turn
pub const FORGET: f64 = 0.05;

/// Pseudo-count mass of the accumulated prior
pub const PRIOR_STRENGTH: f64 = 20.0;

/// Sharpening temperature bounds
pub const TAU_MIN: f64 = 0.7;
pub const TAU_MAX: f64 = 1.3;

/// Effective evidence sample size bounds
pub const ESS_MIN: f64 = 4.0;
pub const ESS_MAX: f64 = 24.0;

/// ESS base on the first turn and on every later turn
pub const ESS_BASE_FIRST_TURN: f64 = 2.0;
pub const ESS_BASE: f64 = 6.0;

/// Floor for zero-probability categories before the power transform
pub const PROBABILITY_FLOOR: f64 = 1e-9;

// =============================================================================
// STOP RULE [C]
// =============================================================================

/// A turn counts as useful at or above this quality
pub const USEFUL_QUALITY: f64 = 0.5;

/// Never stop before this many useful turns
pub const MIN_USEFUL_TURNS: u32 = 4;

/// Always stop at this many useful turns
pub const MAX_USEFUL_TURNS: u32 = 6;

/// Confidence needed to stop on an A1/A2 read
pub const LOW_LEVEL_CONFIDENCE: u32 = 85;

/// Confidence needed to stop on a B1+ read
pub const HIGH_LEVEL_CONFIDENCE: u32 = 70;

/// Quality below which a turn is "very low"
pub const VERY_LOW_QUALITY: f64 = 0.2;

/// Quality below which a turn is "low" for the consecutive run
pub const LOW_QUALITY: f64 = 0.3;

// =============================================================================
// VOICE ACTIVITY [C]
// =============================================================================

/// RMS over [-1, 1] samples above which speech is detected
pub const VAD_RMS_THRESHOLD: f32 = 0.02;

/// Silence budget before a recording stops
pub const SILENCE_MS: u64 = 2000;

/// Silence budget for users self-reporting a low level
pub const LOW_LEVEL_SILENCE_MS: u64 = 3000;

/// Hard recording cap regardless of volume
pub const MAX_RECORDING_MS: u64 = 35_000;

// =============================================================================
// CHAT
// =============================================================================

/// Prompt character cap sent to the reasoning backend
pub const PROMPT_CHAR_LIMIT: usize = 3000;

/// History entries quoted in each chat request
pub const HISTORY_CONTEXT_ENTRIES: usize = 3;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
