//! Listen controller: microphone lifecycle and voice activity detection
//!
//! Driven by `tick` with the latest waveform buffer. Speech above the RMS
//! threshold starts a recording; silence longer than the budget, a manual
//! stop, muting or the hard duration cap ends it. An interruption drops the
//! capture and goes back to listening.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::core::capabilities::AudioClip;
use crate::core::state_store::StateStore;
use crate::error::SessionError;
use crate::types::{SelfReportedLevel, SystemState};

/// Single physical capture device
pub trait Microphone: Send {
    /// Request access; fails when permission is denied or capture is unsupported
    fn acquire(&mut self) -> Result<(), SessionError>;
    fn start_capture(&mut self) -> Result<(), SessionError>;
    /// Stop capturing and hand over the recorded bytes
    fn stop_capture(&mut self) -> Vec<u8>;
    fn release(&mut self);

    fn mime(&self) -> &str {
        "audio/webm"
    }
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    Silence,
    Manual,
    Interruption,
    Mute,
    MaxDuration,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Silence => "silence",
            Self::Manual => "manual",
            Self::Interruption => "interruption",
            Self::Mute => "mute",
            Self::MaxDuration => "max-duration",
        };
        write!(f, "{}", s)
    }
}

/// Result of one tick or stop request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenEvent {
    /// Nothing changed
    Idle,
    RecordingStarted,
    /// Audio ready for transcription; state is `transcribing`
    Captured { clip: AudioClip, reason: StopReason },
    /// Nothing was captured; back to `listening`
    Discarded { reason: StopReason },
    /// Capture dropped; back to `listening`
    Interrupted,
}

/// RMS amplitude of samples in [-1, 1]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum();
    (energy / samples.len() as f32).sqrt()
}

/// RMS of an unsigned 8-bit time-domain buffer (128 = silence)
pub fn rms_from_bytes(bytes: &[u8]) -> f32 {
    let samples: Vec<f32> = bytes.iter().map(|b| (*b as f32 - 128.0) / 128.0).collect();
    rms(&samples)
}

pub struct ListenController {
    mic: Box<dyn Microphone>,
    threshold: f32,
    silence_budget_ms: u64,
    max_recording_ms: u64,
    acquired: bool,
    muted: bool,
    recording_since: Option<u64>,
    last_voice_at: u64,
}

impl std::fmt::Debug for ListenController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenController")
            .field("threshold", &self.threshold)
            .field("silence_budget_ms", &self.silence_budget_ms)
            .field("acquired", &self.acquired)
            .field("muted", &self.muted)
            .field("recording_since", &self.recording_since)
            .finish()
    }
}

impl ListenController {
    pub fn new(mic: Box<dyn Microphone>, config: &SessionConfig, level: SelfReportedLevel) -> Self {
        Self {
            mic,
            threshold: config.vad_threshold,
            silence_budget_ms: config.silence_budget_ms(level),
            max_recording_ms: config.max_recording_ms,
            acquired: false,
            muted: false,
            recording_since: None,
            last_voice_at: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording_since.is_some()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn silence_budget_ms(&self) -> u64 {
        self.silence_budget_ms
    }

    /// Open the microphone. Returns false without side effects unless the
    /// system is `listening` and the microphone is not muted.
    pub fn start(&mut self, state: &StateStore) -> Result<bool, SessionError> {
        if self.muted || !state.is(SystemState::Listening) {
            debug!(state = %state.get(), muted = self.muted, "listen start ignored");
            return Ok(false);
        }
        if self.acquired {
            self.mic.release();
            self.acquired = false;
        }
        self.mic.acquire().map_err(|e| match e {
            SessionError::ResourceUnavailable(_) => e,
            other => SessionError::ResourceUnavailable(other.to_string()),
        })?;
        self.acquired = true;
        debug!("microphone acquired");
        Ok(true)
    }

    /// Feed one waveform buffer taken at `now_ms`
    pub fn tick(&mut self, samples: &[f32], now_ms: u64, state: &mut StateStore) -> ListenEvent {
        let level = rms(samples);

        let Some(since) = self.recording_since else {
            if !self.acquired || self.muted || !state.is(SystemState::Listening) {
                return ListenEvent::Idle;
            }
            if level <= self.threshold {
                return ListenEvent::Idle;
            }
            if let Err(e) = self.mic.start_capture() {
                warn!(error = %e, "could not start capture");
                return ListenEvent::Idle;
            }
            self.recording_since = Some(now_ms);
            self.last_voice_at = now_ms;
            state.set(SystemState::Recording);
            debug!(rms = level, "speech detected, recording");
            return ListenEvent::RecordingStarted;
        };

        if now_ms.saturating_sub(since) >= self.max_recording_ms {
            return self.stop(StopReason::MaxDuration, state);
        }
        if level > self.threshold {
            self.last_voice_at = now_ms;
            return ListenEvent::Idle;
        }
        if now_ms.saturating_sub(self.last_voice_at) > self.silence_budget_ms {
            return self.stop(StopReason::Silence, state);
        }
        ListenEvent::Idle
    }

    /// End the active recording; no-op when not recording
    pub fn stop(&mut self, reason: StopReason, state: &mut StateStore) -> ListenEvent {
        if self.recording_since.take().is_none() {
            return ListenEvent::Idle;
        }
        let bytes = self.mic.stop_capture();
        info!(%reason, bytes = bytes.len(), "recording stopped");

        if reason == StopReason::Interruption {
            state.set(SystemState::Listening);
            return ListenEvent::Interrupted;
        }
        if bytes.is_empty() {
            state.set(SystemState::Listening);
            return ListenEvent::Discarded { reason };
        }

        self.mic.release();
        self.acquired = false;
        state.set(SystemState::Transcribing);
        ListenEvent::Captured {
            clip: AudioClip::new(bytes, self.mic.mime()),
            reason,
        }
    }

    /// Stop for playback or another external reason
    pub fn interrupt(&mut self, state: &mut StateStore) -> ListenEvent {
        self.stop(StopReason::Interruption, state)
    }

    /// Mute or unmute; muting while recording forces a stop
    pub fn set_muted(&mut self, muted: bool, state: &mut StateStore) -> ListenEvent {
        self.muted = muted;
        if muted {
            self.stop(StopReason::Mute, state)
        } else {
            ListenEvent::Idle
        }
    }

    /// Drop any capture and give the microphone back
    pub fn release(&mut self) {
        if self.recording_since.take().is_some() {
            let _ = self.mic.stop_capture();
        }
        if self.acquired {
            self.mic.release();
            self.acquired = false;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        acquired: u32,
        released: u32,
        capturing: bool,
    }

    struct FakeMic {
        log: Arc<Mutex<Log>>,
        payload: Vec<u8>,
        deny: bool,
    }

    impl Microphone for FakeMic {
        fn acquire(&mut self) -> Result<(), SessionError> {
            if self.deny {
                return Err(SessionError::ResourceUnavailable("permission denied".into()));
            }
            self.log.lock().unwrap().acquired += 1;
            Ok(())
        }
        fn start_capture(&mut self) -> Result<(), SessionError> {
            self.log.lock().unwrap().capturing = true;
            Ok(())
        }
        fn stop_capture(&mut self) -> Vec<u8> {
            self.log.lock().unwrap().capturing = false;
            self.payload.clone()
        }
        fn release(&mut self) {
            self.log.lock().unwrap().released += 1;
        }
    }

    fn controller(payload: &[u8], level: SelfReportedLevel) -> (ListenController, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let mic = FakeMic {
            log: log.clone(),
            payload: payload.to_vec(),
            deny: false,
        };
        (
            ListenController::new(Box::new(mic), &SessionConfig::default(), level),
            log,
        )
    }

    fn listening() -> StateStore {
        let mut state = StateStore::new();
        state.set(SystemState::Listening);
        state
    }

    const LOUD: [f32; 4] = [0.5, -0.5, 0.5, -0.5];
    const QUIET: [f32; 4] = [0.0, 0.01, -0.01, 0.0];

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&LOUD) - 0.5).abs() < 1e-6);
        assert_eq!(rms_from_bytes(&[128, 128, 128]), 0.0);
        assert!((rms_from_bytes(&[0, 255]) - 0.996).abs() < 0.01);
    }

    #[test]
    fn test_start_only_when_listening() {
        let (mut listen, log) = controller(b"x", SelfReportedLevel::Medium);
        assert!(!listen.start(&StateStore::new()).unwrap());
        assert_eq!(log.lock().unwrap().acquired, 0);
        assert!(listen.start(&listening()).unwrap());
        assert_eq!(log.lock().unwrap().acquired, 1);
    }

    #[test]
    fn test_denied_microphone_is_unavailable() {
        let mic = FakeMic {
            log: Arc::new(Mutex::new(Log::default())),
            payload: vec![],
            deny: true,
        };
        let mut listen = ListenController::new(Box::new(mic), &SessionConfig::default(), SelfReportedLevel::Low);
        let err = listen.start(&listening()).unwrap_err();
        assert!(matches!(err, SessionError::ResourceUnavailable(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_speech_then_silence_goes_to_transcribing() {
        let (mut listen, log) = controller(b"audio", SelfReportedLevel::Medium);
        let mut state = listening();
        listen.start(&state).unwrap();

        assert_eq!(listen.tick(&QUIET, 0, &mut state), ListenEvent::Idle);
        assert_eq!(listen.tick(&LOUD, 100, &mut state), ListenEvent::RecordingStarted);
        assert_eq!(state.get(), SystemState::Recording);

        assert_eq!(listen.tick(&QUIET, 1500, &mut state), ListenEvent::Idle);
        assert_eq!(listen.tick(&QUIET, 2100, &mut state), ListenEvent::Idle);
        match listen.tick(&QUIET, 2101, &mut state) {
            ListenEvent::Captured { clip, reason } => {
                assert_eq!(reason, StopReason::Silence);
                assert_eq!(clip.bytes, b"audio".to_vec());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(state.get(), SystemState::Transcribing);
        assert_eq!(log.lock().unwrap().released, 1);
    }

    #[test]
    fn test_low_level_gets_longer_silence_budget() {
        let (mut listen, _) = controller(b"audio", SelfReportedLevel::Low);
        assert_eq!(listen.silence_budget_ms(), 3000);
        let mut state = listening();
        listen.start(&state).unwrap();
        listen.tick(&LOUD, 0, &mut state);
        assert_eq!(listen.tick(&QUIET, 2500, &mut state), ListenEvent::Idle);
        assert!(listen.is_recording());
    }

    #[test]
    fn test_voice_resets_silence_timer() {
        let (mut listen, _) = controller(b"audio", SelfReportedLevel::Medium);
        let mut state = listening();
        listen.start(&state).unwrap();
        listen.tick(&LOUD, 0, &mut state);
        listen.tick(&LOUD, 1900, &mut state);
        assert_eq!(listen.tick(&QUIET, 3000, &mut state), ListenEvent::Idle);
        assert!(listen.is_recording());
    }

    #[test]
    fn test_max_duration_forces_stop() {
        let (mut listen, _) = controller(b"audio", SelfReportedLevel::Medium);
        let mut state = listening();
        listen.start(&state).unwrap();
        listen.tick(&LOUD, 0, &mut state);
        for t in (1000..35_000).step_by(1000) {
            assert_eq!(listen.tick(&LOUD, t, &mut state), ListenEvent::Idle);
        }
        assert!(matches!(
            listen.tick(&LOUD, 35_000, &mut state),
            ListenEvent::Captured { reason: StopReason::MaxDuration, .. }
        ));
    }

    #[test]
    fn test_interruption_returns_to_listening() {
        let (mut listen, log) = controller(b"audio", SelfReportedLevel::Medium);
        let mut state = listening();
        listen.start(&state).unwrap();
        listen.tick(&LOUD, 0, &mut state);
        assert_eq!(listen.interrupt(&mut state), ListenEvent::Interrupted);
        assert_eq!(state.get(), SystemState::Listening);
        assert_eq!(log.lock().unwrap().released, 0);
        assert!(!log.lock().unwrap().capturing);
    }

    #[test]
    fn test_empty_capture_is_discarded() {
        let (mut listen, _) = controller(b"", SelfReportedLevel::Medium);
        let mut state = listening();
        listen.start(&state).unwrap();
        listen.tick(&LOUD, 0, &mut state);
        assert_eq!(
            listen.stop(StopReason::Manual, &mut state),
            ListenEvent::Discarded { reason: StopReason::Manual }
        );
        assert_eq!(state.get(), SystemState::Listening);
    }

    #[test]
    fn test_mute_forces_stop_and_blocks_detection() {
        let (mut listen, _) = controller(b"audio", SelfReportedLevel::Medium);
        let mut state = listening();
        listen.start(&state).unwrap();
        listen.tick(&LOUD, 0, &mut state);
        assert!(matches!(
            listen.set_muted(true, &mut state),
            ListenEvent::Captured { reason: StopReason::Mute, .. }
        ));

        state.set(SystemState::Listening);
        assert!(!listen.start(&state).unwrap());
        assert_eq!(listen.tick(&LOUD, 5000, &mut state), ListenEvent::Idle);
    }

    #[test]
    fn test_no_detection_outside_listening() {
        let (mut listen, _) = controller(b"audio", SelfReportedLevel::Medium);
        let mut state = listening();
        listen.start(&state).unwrap();
        state.set(SystemState::Speaking);
        assert_eq!(listen.tick(&LOUD, 0, &mut state), ListenEvent::Idle);
        assert_eq!(state.get(), SystemState::Speaking);
    }
}
