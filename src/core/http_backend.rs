//! HTTP client for the chat / transcription / speech / scoring backend
//!
//! - POST /chat        {"message": prompt}           → {"reply", "quality"|"Q", "distribution"|"P_nueva"}
//! - POST /transcribe  multipart "file"              → {"text"}
//! - POST /tts         {"text"}                      → audio bytes
//! - POST /evaluate    {"history", "raw_evaluation"} → FinalScore

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::core::capabilities::{
    AudioClip, AudioHandle, ChatReply, ChatRequest, Conversant, Scorer, Synthesizer, Transcriber,
};
use crate::error::SessionError;
use crate::types::{EvaluationEntry, FinalScore, TurnHistory};

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Deserialize)]
struct TranscriptBody {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn checked(
        capability: &'static str,
        resp: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<reqwest::Response, SessionError> {
        let resp = resp.map_err(|e| SessionError::transport(capability, e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::transport(
                capability,
                format!("HTTP {}: {}", status, body),
            ));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Conversant for HttpBackend {
    async fn converse(&self, request: &ChatRequest) -> Result<ChatReply, SessionError> {
        let prompt = request.render();
        debug!(chars = prompt.chars().count(), "POST /chat");
        let resp = self
            .client
            .post(self.url("chat"))
            .json(&json!({ "message": prompt }))
            .send()
            .await;
        let resp = Self::checked("chat", resp).await?;
        resp.json::<ChatReply>()
            .await
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl Transcriber for HttpBackend {
    async fn transcribe(&self, audio: &AudioClip) -> Result<String, SessionError> {
        let part = reqwest::multipart::Part::bytes(audio.bytes.clone())
            .file_name("audio.webm")
            .mime_str(&audio.mime)
            .map_err(|e| SessionError::transport("transcribe", e))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        debug!(bytes = audio.bytes.len(), "POST /transcribe");
        let resp = self
            .client
            .post(self.url("transcribe"))
            .multipart(form)
            .send()
            .await;
        let resp = Self::checked("transcribe", resp).await?;
        let body: TranscriptBody = resp
            .json()
            .await
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))?;
        Ok(body.text)
    }
}

#[async_trait]
impl Synthesizer for HttpBackend {
    async fn synthesize(&self, text: &str) -> Result<AudioHandle, SessionError> {
        let resp = self
            .client
            .post(self.url("tts"))
            .json(&json!({ "text": text }))
            .send()
            .await;
        let resp = Self::checked("tts", resp).await?;
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SessionError::transport("tts", e))?;
        Ok(AudioHandle::new(bytes.to_vec(), mime))
    }
}

#[async_trait]
impl Scorer for HttpBackend {
    async fn score(
        &self,
        history: &TurnHistory,
        raw_log: &[EvaluationEntry],
    ) -> Result<FinalScore, SessionError> {
        debug!(turns = history.len(), "POST /evaluate");
        let resp = self
            .client
            .post(self.url("evaluate"))
            .json(&json!({ "history": history, "raw_evaluation": raw_log }))
            .send()
            .await;
        let resp = Self::checked("evaluate", resp).await?;
        resp.json::<FinalScore>()
            .await
            .map_err(|e| SessionError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let backend = HttpBackend::new("http://localhost:5000/");
        assert_eq!(backend.base_url(), "http://localhost:5000");
        assert_eq!(backend.url("/chat"), "http://localhost:5000/chat");
        assert_eq!(backend.url("tts"), "http://localhost:5000/tts");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let backend = HttpBackend::new("http://127.0.0.1:9");
        let err = backend
            .synthesize("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Transport { capability: "tts", .. }));
        assert!(err.is_recoverable());
    }
}
