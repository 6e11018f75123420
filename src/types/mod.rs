//! Core types for levelbot

mod distribution;
mod level;
mod output;
mod profile;
mod reason;
mod state;
mod turn;

pub use distribution::LevelDistribution;
pub use level::{Level, SelfReportedLevel};
pub use output::{progress, TurnOutput};
pub use profile::{FinalScore, Observation, ObservationKind, UserProfile};
pub use reason::ReasonCode;
pub use state::{Presentation, SystemState};
pub use turn::{EvaluationEntry, QuestionType, TurnHistory, TurnRecord};
