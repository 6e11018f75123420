//! Turn controller: one placement session from greeting to final score
//!
//! `Session` holds every piece of per-session state (system state, belief,
//! quality history, turn history, raw evaluation log) and applies a turn in
//! two steps:
//!
//! 1. `begin_turn` records the user's utterance, picks the next question type
//!    and builds the chat request.
//! 2. `apply_response` validates the reply and commits all per-turn mutations
//!    as one unit, then runs the stop rule.
//!
//! A response for a turn that is no longer in flight (or arrives after the
//! session was finalized) is ignored without touching anything.
//!
//! `TurnController` wraps a `Session` with the async capabilities and runs the
//! full transcribe → converse → speak → listen cycle.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::core::belief::BeliefEngine;
use crate::core::capabilities::{
    AudioClip, ChatReply, ChatRequest, Conversant, Scorer, Transcriber,
};
use crate::core::listen::ListenController;
use crate::core::persistence::{
    clear_session, save, KeyValueStore, Resumption, KEY_FEEDBACK, KEY_FINAL_EVALUATION,
    KEY_HISTORY, KEY_RAW_EVALUATION, KEY_USER,
};
use crate::core::playback::PlaybackController;
use crate::core::selector::QuestionTypeSelector;
use crate::core::state_store::StateStore;
use crate::core::stop_rule::StopRule;
use crate::error::SessionError;
use crate::types::{
    progress, EvaluationEntry, FinalScore, Level, LevelDistribution, QuestionType, ReasonCode,
    SystemState, TurnHistory, TurnOutput, TurnRecord, UserProfile,
};
use crate::{QUALITY_DISCARD_BELOW, USEFUL_QUALITY};

/// Capacity of the per-session event channel
pub const EVENT_CAPACITY: usize = 100;

/// Conversation phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    AwaitingFirstTurn,
    AwaitingUserResponse,
    TurnInFlight,
    Closing,
    Closed,
}

/// Notifications published by a session
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged { from: SystemState, to: SystemState },
    TurnAdvanced { record: TurnRecord, output: TurnOutput },
    Finalized { score: FinalScore },
}

/// Chat request issued and not yet applied
#[derive(Debug, Clone)]
pub struct PendingTurn {
    seq: u64,
    pub question_type: QuestionType,
    pub request: ChatRequest,
}

impl PendingTurn {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// What happened to a chat response
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Turn applied, ask the next question
    Continue { reply: String, output: TurnOutput },
    /// Turn applied and the stop rule fired
    Finalize { reply: String, output: TurnOutput },
    /// Response dropped without mutation
    Ignored(ReasonCode),
    /// Nothing was said
    NoSpeech,
}

impl TurnOutcome {
    pub fn output(&self) -> Option<&TurnOutput> {
        match self {
            Self::Continue { output, .. } | Self::Finalize { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Continue { reply, .. } | Self::Finalize { reply, .. } => Some(reply),
            _ => None,
        }
    }
}

/// Snapshot for status queries
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub phase: Phase,
    pub state: SystemState,
    pub distribution: LevelDistribution,
    pub dominant: Level,
    pub confidence: u32,
    pub useful_turns: u32,
    pub applied_turns: u32,
    pub progress: u32,
    pub turns: usize,
    pub finalized: bool,
}

// =============================================================================
// SESSION
// =============================================================================

pub struct Session {
    config: SessionConfig,
    profile: UserProfile,
    state: StateStore,
    phase: Phase,
    distribution: LevelDistribution,
    quality_history: Vec<f64>,
    useful_turns: u32,
    applied_turns: u32,
    history: TurnHistory,
    raw_log: Vec<EvaluationEntry>,
    finalized: bool,
    resumed: bool,
    score: Option<FinalScore>,
    last_output: Option<TurnOutput>,
    seq: u64,
    in_flight: Option<u64>,
    belief: BeliefEngine,
    stop_rule: StopRule,
    selector: QuestionTypeSelector,
    rng: StdRng,
    store: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("state", &self.state.get())
            .field("distribution", &self.distribution)
            .field("useful_turns", &self.useful_turns)
            .field("applied_turns", &self.applied_turns)
            .field("turns", &self.history.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl Session {
    /// Fresh session seeded from the profile's self-reported level
    pub fn new(profile: UserProfile, config: SessionConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut state = StateStore::new();
        let tx = events.clone();
        state.subscribe(move |from, to| {
            let _ = tx.send(SessionEvent::StateChanged { from, to });
        });

        Self {
            distribution: LevelDistribution::seed(profile.level),
            belief: BeliefEngine::from_config(&config),
            config,
            profile,
            state,
            phase: Phase::AwaitingFirstTurn,
            quality_history: Vec::new(),
            useful_turns: 0,
            applied_turns: 0,
            history: TurnHistory::new(),
            raw_log: Vec::new(),
            finalized: false,
            resumed: false,
            score: None,
            last_output: None,
            seq: 0,
            in_flight: None,
            stop_rule: StopRule::new(),
            selector: QuestionTypeSelector::new(),
            rng: StdRng::from_entropy(),
            store,
            events,
        }
    }

    /// Rebuild a session from the store; `None` when nothing was saved
    pub fn restore(
        config: SessionConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Option<Self>, SessionError> {
        match Resumption::inspect(store.as_ref())? {
            Resumption::Fresh => Ok(None),
            Resumption::Closed {
                profile,
                history,
                score,
            } => {
                let mut session = Self::new(profile.unwrap_or_default(), config, store);
                session.restore_history(history, Vec::new());
                session.finalized = true;
                session.score = Some(score);
                session.phase = Phase::Closed;
                session.state.set(SystemState::FeedbackDone);
                info!(turns = session.history.len(), "restored closed session");
                Ok(Some(session))
            }
            Resumption::Scoring {
                profile,
                history,
                raw_log,
            } => {
                let mut session = Self::new(profile.unwrap_or_default(), config, store);
                session.restore_history(history, raw_log);
                session.finalized = true;
                session.phase = Phase::Closing;
                session.state.set(SystemState::ProcessingFeedback);
                info!(turns = session.history.len(), "restored session awaiting its score");
                Ok(Some(session))
            }
            Resumption::InProgress {
                profile,
                history,
                raw_log,
            } => {
                let mut session = Self::new(profile, config, store);
                session.restore_history(history, raw_log);
                session.phase = Phase::AwaitingUserResponse;
                info!(
                    turns = session.history.len(),
                    useful = session.useful_turns,
                    "restored session in progress"
                );
                Ok(Some(session))
            }
        }
    }

    fn restore_history(&mut self, history: TurnHistory, raw_log: Vec<EvaluationEntry>) {
        self.quality_history = history.records().iter().filter_map(|r| r.quality).collect();
        self.useful_turns = self
            .quality_history
            .iter()
            .filter(|q| **q >= USEFUL_QUALITY)
            .count() as u32;
        self.applied_turns = self.quality_history.len() as u32;
        if let Some(dist) = history.records().iter().rev().find_map(|r| r.distribution) {
            self.distribution = dist;
        }
        self.history = history;
        self.raw_log = raw_log;
        self.resumed = true;
    }

    /// Fix the selector's random source
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateStore {
        &mut self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn distribution(&self) -> &LevelDistribution {
        &self.distribution
    }

    pub fn quality_history(&self) -> &[f64] {
        &self.quality_history
    }

    pub fn useful_turns(&self) -> u32 {
        self.useful_turns
    }

    pub fn applied_turns(&self) -> u32 {
        self.applied_turns
    }

    pub fn history(&self) -> &TurnHistory {
        &self.history
    }

    pub fn raw_log(&self) -> &[EvaluationEntry] {
        &self.raw_log
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn score(&self) -> Option<&FinalScore> {
        self.score.as_ref()
    }

    pub fn last_output(&self) -> Option<&TurnOutput> {
        self.last_output.as_ref()
    }

    /// Bot question still waiting for an answer (replayed on resumption)
    pub fn pending_prompt(&self) -> Option<&str> {
        self.history
            .last()
            .filter(|r| r.awaits_response())
            .and_then(|r| r.prompt.as_deref())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            state: self.state.get(),
            distribution: self.distribution,
            dominant: self.distribution.dominant(),
            confidence: self.distribution.confidence(),
            useful_turns: self.useful_turns,
            applied_turns: self.applied_turns,
            progress: progress(self.useful_turns),
            turns: self.history.len(),
            finalized: self.finalized,
        }
    }

    // -------------------------------------------------------------------------
    // Turn workflow
    // -------------------------------------------------------------------------

    /// Emit the greeting. No remote call is made.
    pub fn start(&mut self) -> Result<String, SessionError> {
        if self.phase != Phase::AwaitingFirstTurn {
            warn!(phase = ?self.phase, "start rejected");
            return Err(SessionError::InvalidTransition {
                from: self.state.get(),
                operation: "start the session",
            });
        }
        let greeting = self.profile.greeting();
        self.distribution = LevelDistribution::seed(self.profile.level);
        self.history.push(TurnRecord::prompt(greeting.clone()));
        self.persist(KEY_USER, &self.profile);
        self.persist(KEY_HISTORY, &self.history);
        self.phase = Phase::AwaitingUserResponse;
        info!(
            level = %self.profile.level,
            seed = %self.distribution.to_compact_string(),
            "session started"
        );
        Ok(greeting)
    }

    /// Record the user's utterance and build the next chat request
    pub fn begin_turn(&mut self, utterance: &str) -> Result<PendingTurn, SessionError> {
        if self.finalized {
            return Err(SessionError::Finalized);
        }
        if self.phase != Phase::AwaitingUserResponse {
            warn!(phase = ?self.phase, "turn rejected");
            return Err(SessionError::InvalidTransition {
                from: self.state.get(),
                operation: "begin a turn",
            });
        }

        self.history.record_response(utterance);
        self.persist(KEY_HISTORY, &self.history);

        let question_type = self
            .selector
            .select(&self.distribution, &self.history, &mut self.rng);
        let request = ChatRequest::new(
            &self.profile,
            self.distribution.dominant(),
            question_type,
            utterance,
            &self.history,
            self.config.history_context,
        );

        self.seq += 1;
        self.in_flight = Some(self.seq);
        self.phase = Phase::TurnInFlight;
        self.state.set(SystemState::Chatting);
        debug!(seq = self.seq, %question_type, target = %request.target_level, "turn issued");

        Ok(PendingTurn {
            seq: self.seq,
            question_type,
            request,
        })
    }

    /// Validate and commit a chat response
    pub fn apply_response(
        &mut self,
        pending: &PendingTurn,
        reply: ChatReply,
    ) -> Result<TurnOutcome, SessionError> {
        if self.finalized || self.in_flight != Some(pending.seq) {
            warn!(
                seq = pending.seq,
                reason = ReasonCode::S005_LATE_RESPONSE.code(),
                "stale chat response ignored"
            );
            return Ok(TurnOutcome::Ignored(ReasonCode::S005_LATE_RESPONSE));
        }

        let text = reply
            .reply
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let (text, evidence) = match (text, reply.distribution) {
            (Some(text), Some(evidence)) => (text, evidence),
            (text, evidence) => {
                warn!(
                    reason = ReasonCode::S005_MALFORMED_RESPONSE.code(),
                    has_reply = text.is_some(),
                    has_distribution = evidence.is_some(),
                    "malformed chat response, turn aborted"
                );
                self.abort_turn();
                return Err(SessionError::MalformedResponse(
                    "reply and distribution are required".to_string(),
                ));
            }
        };
        let quality = reply
            .quality
            .filter(|q| q.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        // Everything below commits together
        let first_turn = self.config.thread_first_turn && self.applied_turns == 0 && !self.resumed;
        self.distribution = self
            .belief
            .update(&self.distribution, &evidence, quality, first_turn);
        self.quality_history.push(quality);
        self.applied_turns += 1;
        if quality >= USEFUL_QUALITY {
            self.useful_turns += 1;
        }
        self.raw_log.push(EvaluationEntry { evidence, quality });
        let record = TurnRecord::scored(text.clone(), pending.question_type, quality, self.distribution);
        self.history.push(record.clone());
        self.in_flight = None;

        let decision = self
            .stop_rule
            .evaluate(&self.distribution, &self.quality_history, self.useful_turns);
        let reason = if !decision.stop && quality < QUALITY_DISCARD_BELOW {
            ReasonCode::S005_EVIDENCE_DISCARDED
        } else {
            decision.reason
        };
        if decision.stop {
            self.finalized = true;
            self.phase = Phase::Closing;
            self.persist(KEY_FINAL_EVALUATION, &true);
        } else {
            self.phase = Phase::AwaitingUserResponse;
        }

        let output = TurnOutput {
            timestamp: chrono::Utc::now(),
            quality,
            distribution: self.distribution,
            dominant: self.distribution.dominant(),
            confidence: self.distribution.confidence(),
            useful_turns: self.useful_turns,
            progress: progress(self.useful_turns),
            question_type: pending.question_type,
            reason,
            finalized: decision.stop,
        };
        self.last_output = Some(output.clone());

        self.persist(KEY_HISTORY, &self.history);
        self.persist(KEY_RAW_EVALUATION, &self.raw_log);
        info!(
            quality,
            dist = %self.distribution.to_compact_string(),
            useful = self.useful_turns,
            reason = reason.code(),
            "turn applied"
        );
        let _ = self.events.send(SessionEvent::TurnAdvanced {
            record,
            output: output.clone(),
        });

        if decision.stop {
            info!(level = %output.dominant, confidence = output.confidence, "session finalized");
            Ok(TurnOutcome::Finalize { reply: text, output })
        } else {
            Ok(TurnOutcome::Continue { reply: text, output })
        }
    }

    /// Drop the in-flight turn without touching belief or history
    pub fn abort_turn(&mut self) {
        if self.phase == Phase::TurnInFlight {
            self.in_flight = None;
            self.phase = Phase::AwaitingUserResponse;
        }
    }

    /// Enter `processing-feedback`
    pub fn mark_scoring(&mut self) {
        self.state.set(SystemState::ProcessingFeedback);
    }

    /// Store the final score; the first one wins
    pub fn finish(&mut self, score: FinalScore) -> Result<(), SessionError> {
        if !self.finalized {
            return Err(SessionError::InvalidTransition {
                from: self.state.get(),
                operation: "store a final score",
            });
        }
        if self.phase == Phase::Closed {
            return Ok(());
        }
        self.persist(KEY_FEEDBACK, &score);
        self.persist(KEY_FINAL_EVALUATION, &true);
        self.score = Some(score.clone());
        self.phase = Phase::Closed;
        self.state.set(SystemState::FeedbackDone);
        info!(level = %score.level, "final score stored");
        let _ = self.events.send(SessionEvent::Finalized { score });
        Ok(())
    }

    /// Go back to `listening` unless scoring has started or the session closed
    pub fn resume_listening(&mut self) -> bool {
        let current = self.state.get();
        if self.finalized || current.is_final() {
            debug!(state = %current, "listening stays off");
            return false;
        }
        self.state.set(SystemState::Listening);
        true
    }

    /// Forget everything and start over with the same profile
    pub fn reset(&mut self) -> Result<(), SessionError> {
        clear_session(self.store.as_ref())?;
        self.phase = Phase::AwaitingFirstTurn;
        self.distribution = LevelDistribution::seed(self.profile.level);
        self.quality_history.clear();
        self.useful_turns = 0;
        self.applied_turns = 0;
        self.history = TurnHistory::new();
        self.raw_log.clear();
        self.finalized = false;
        self.resumed = false;
        self.score = None;
        self.last_output = None;
        self.in_flight = None;
        self.state.set(SystemState::Idle);
        info!("session reset");
        Ok(())
    }

    fn persist<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = save(self.store.as_ref(), key, value) {
            warn!(key, error = %e, "could not persist session data");
        }
    }
}

// =============================================================================
// ASYNC DRIVER
// =============================================================================

/// Remote capabilities used by the turn workflow
#[derive(Clone)]
pub struct Capabilities {
    pub transcriber: Arc<dyn Transcriber>,
    pub conversant: Arc<dyn Conversant>,
    pub scorer: Arc<dyn Scorer>,
}

impl Capabilities {
    /// One backend serving every capability
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: Transcriber + Conversant + Scorer + 'static,
    {
        Self {
            transcriber: backend.clone(),
            conversant: backend.clone(),
            scorer: backend,
        }
    }
}

/// Runs the full turn cycle for one session
pub struct TurnController {
    session: Session,
    caps: Capabilities,
    playback: Option<PlaybackController>,
    listen: Option<ListenController>,
}

impl std::fmt::Debug for TurnController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnController")
            .field("session", &self.session)
            .field("playback", &self.playback)
            .field("listen", &self.listen)
            .finish()
    }
}

impl TurnController {
    pub fn new(session: Session, caps: Capabilities) -> Self {
        Self {
            session,
            caps,
            playback: None,
            listen: None,
        }
    }

    pub fn with_playback(mut self, playback: PlaybackController) -> Self {
        self.playback = Some(playback);
        self
    }

    pub fn with_listener(mut self, listen: ListenController) -> Self {
        self.listen = Some(listen);
        self
    }

    pub fn listener(&self) -> Option<&ListenController> {
        self.listen.as_ref()
    }

    /// Listener together with the state it drives
    pub fn listener_mut(&mut self) -> Option<(&mut ListenController, &mut StateStore)> {
        let listen = self.listen.as_mut()?;
        Some((listen, self.session.state_mut()))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Greet the user and open the microphone
    pub async fn open(&mut self) -> Result<String, SessionError> {
        let greeting = self.session.start()?;
        self.session.resume_listening();
        self.speak(&greeting).await;
        self.session.resume_listening();
        Ok(greeting)
    }

    /// Transcribe a finished recording and run the turn it carries
    pub async fn handle_capture(&mut self, clip: AudioClip) -> Result<TurnOutcome, SessionError> {
        if clip.is_empty() {
            self.session.resume_listening();
            return Ok(TurnOutcome::NoSpeech);
        }
        self.session.state_mut().set(SystemState::Transcribing);
        let text = match self.caps.transcriber.transcribe(&clip).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "transcription failed");
                self.session.resume_listening();
                return Err(e);
            }
        };
        if text.trim().is_empty() {
            debug!("empty transcript");
            self.session.resume_listening();
            return Ok(TurnOutcome::NoSpeech);
        }
        self.run_turn(text.trim()).await
    }

    /// One full turn for a typed or transcribed utterance
    pub async fn run_turn(&mut self, utterance: &str) -> Result<TurnOutcome, SessionError> {
        let pending = self.session.begin_turn(utterance)?;

        let reply = match self.caps.conversant.converse(&pending.request).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "chat call failed");
                self.session.abort_turn();
                self.session.resume_listening();
                return Err(e);
            }
        };

        let outcome = match self.session.apply_response(&pending, reply) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.session.resume_listening();
                return Err(e);
            }
        };

        match &outcome {
            TurnOutcome::Continue { reply, .. } => {
                let reply = reply.clone();
                self.speak(&reply).await;
                self.session.resume_listening();
            }
            TurnOutcome::Finalize { .. } => {
                // The turn is committed; a failed score is retried through `finalize`
                if let Err(e) = self.finalize().await {
                    warn!(error = %e, "session closed without a score yet");
                }
            }
            TurnOutcome::Ignored(_) | TurnOutcome::NoSpeech => {}
        }
        Ok(outcome)
    }

    /// Mute the listener, speak the closing line, request the final score and
    /// close the session. Returns the stored score when already closed; after a
    /// failed scoring call it only retries the score.
    pub async fn finalize(&mut self) -> Result<FinalScore, SessionError> {
        if let Some(score) = self.session.score() {
            return Ok(score.clone());
        }
        if !self.session.is_finalized() {
            return Err(SessionError::InvalidTransition {
                from: self.session.state().get(),
                operation: "finalize",
            });
        }

        if let Some(listen) = self.listen.as_mut() {
            let state = self.session.state_mut();
            listen.interrupt(state);
            listen.set_muted(true, state);
            listen.release();
        }

        if !self.session.state().is(SystemState::ProcessingFeedback) {
            let closing = self.session.profile().closing();
            self.speak(&closing).await;
            self.session.mark_scoring();
        }

        let score = self
            .caps
            .scorer
            .score(self.session.history(), self.session.raw_log())
            .await
            .map_err(|e| {
                error!(error = %e, "final scoring failed");
                e
            })?;
        self.session.finish(score.clone())?;
        Ok(score)
    }

    /// Replay a bot line on request, cutting off any recording in progress
    pub async fn replay(&mut self, text: &str) -> Result<(), SessionError> {
        if self.session.state().is(SystemState::Recording) {
            if let Some(listen) = self.listen.as_mut() {
                listen.interrupt(self.session.state_mut());
            }
        }
        let Some(playback) = self.playback.as_mut() else {
            return Ok(());
        };
        playback.speak(text, self.session.state_mut()).await?;
        self.session.resume_listening();
        Ok(())
    }

    async fn speak(&mut self, text: &str) {
        if let Some(playback) = self.playback.as_mut() {
            if let Err(e) = playback.speak(text, self.session.state_mut()).await {
                warn!(error = %e, "playback failed");
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
