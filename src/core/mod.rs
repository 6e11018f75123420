//! Core modules for levelbot

pub mod state_store;
pub mod belief;
pub mod stop_rule;
pub mod selector;
pub mod capabilities;
pub mod persistence;
pub mod listen;
pub mod playback;
pub mod turn_controller;
pub mod http_backend;
pub mod api;

pub use state_store::{StateStore, SubscriptionId};
pub use belief::{summary_distribution, to_percentages, BeliefEngine};
pub use stop_rule::{StopDecision, StopRule};
pub use selector::{allowed_types, coverage, QuestionTypeSelector};
pub use capabilities::{
    AudioClip, AudioHandle, ChatReply, ChatRequest, Conversant, Scorer, Synthesizer, Transcriber,
};
pub use persistence::{FileStore, KeyValueStore, MemoryStore, Resumption};
pub use listen::{ListenController, ListenEvent, Microphone, StopReason};
pub use playback::{AudioOutput, Avatar, PlaybackController};
pub use turn_controller::{
    Capabilities, PendingTurn, Phase, Session, SessionEvent, SessionStatus, TurnController,
    TurnOutcome,
};
pub use http_backend::HttpBackend;
pub use api::{create_router, run_server};
