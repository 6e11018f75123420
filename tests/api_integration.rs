//! Integration tests for the HTTP API
//!
//! Tests endpoints against a scripted backend

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use levelbot::core::{create_router, AudioClip, Capabilities, ChatReply, ChatRequest, Conversant, Scorer, Transcriber};
use levelbot::types::{EvaluationEntry, FinalScore, LevelDistribution, TurnHistory};
use levelbot::{SessionConfig, SessionError};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<ChatReply, SessionError>>>,
    score_failures: AtomicUsize,
}

#[async_trait]
impl Conversant for ScriptedBackend {
    async fn converse(&self, _request: &ChatRequest) -> Result<ChatReply, SessionError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatReply::new("And then?", 0.8, upper())))
    }
}

#[async_trait]
impl Transcriber for ScriptedBackend {
    async fn transcribe(&self, _audio: &AudioClip) -> Result<String, SessionError> {
        Ok("hello".to_string())
    }
}

#[async_trait]
impl Scorer for ScriptedBackend {
    async fn score(
        &self,
        _history: &TurnHistory,
        _raw_log: &[EvaluationEntry],
    ) -> Result<FinalScore, SessionError> {
        let failing = self
            .score_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SessionError::transport("evaluate", "HTTP 503"));
        }
        Ok(FinalScore {
            level: "B2".to_string(),
            message: "Good job".to_string(),
            observations: vec![],
        })
    }
}

fn upper() -> LevelDistribution {
    LevelDistribution::new([5, 10, 15, 35, 35])
}

fn create_test_router(replies: Vec<Result<ChatReply, SessionError>>) -> Router {
    router_with_score_failures(replies, 0)
}

fn router_with_score_failures(
    replies: Vec<Result<ChatReply, SessionError>>,
    score_failures: usize,
) -> Router {
    let backend = Arc::new(ScriptedBackend {
        replies: Mutex::new(replies.into()),
        score_failures: AtomicUsize::new(score_failures),
    });
    create_router(SessionConfig::default(), Capabilities::from_backend(backend))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn new_session(app: &Router) -> String {
    let (status, json) = send(
        app,
        "POST",
        "/session/new",
        Some(r#"{"name": "Ana", "language": "English", "situation": "job interview"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    json["session_id"].as_str().unwrap().to_string()
}

async fn turn(app: &Router, id: &str, text: &str) -> (StatusCode, Value) {
    let body = serde_json::json!({ "text": text }).to_string();
    send(app, "POST", &format!("/session/{id}/turn"), Some(&body)).await
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router(vec![]);
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["sessions_active"], 0);
}

#[tokio::test]
async fn test_create_session() {
    let app = create_test_router(vec![]);
    let (status, json) = send(
        &app,
        "POST",
        "/session/new",
        Some(r#"{"name": "Ana", "language": "English", "situation": "job interview", "level": "medium"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let id = json["session_id"].as_str().unwrap();
    assert!(id.starts_with("session_"));
    assert_eq!(json["websocket_url"], format!("/ws/{id}"));
    assert!(json["greeting"].as_str().unwrap().contains("Ana"));
    assert_eq!(json["status"]["phase"], "awaiting-user-response");
    assert_eq!(json["status"]["state"], "listening");
    assert_eq!(json["status"]["distribution"]["B1"], 40);

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["sessions_active"], 1);
}

#[tokio::test]
async fn test_incomplete_profile_rejected() {
    let app = create_test_router(vec![]);
    let (status, _) = send(
        &app,
        "POST",
        "/session/new",
        Some(r#"{"name": "Ana", "language": "", "situation": "job interview"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_not_found() {
    let app = create_test_router(vec![]);
    for uri in [
        "/session/nonexistent",
        "/session/nonexistent/history",
        "/session/nonexistent/score",
    ] {
        let (status, _) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
    let (status, _) = turn(&app, "nonexistent", "hello").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blank_turn_rejected() {
    let app = create_test_router(vec![]);
    let id = new_session(&app).await;
    let (status, _) = turn(&app, &id, "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_score_not_available_before_close() {
    let app = create_test_router(vec![]);
    let id = new_session(&app).await;
    turn(&app, &id, "hello").await;

    let (status, _) = send(&app, "GET", &format!("/session/{id}/score"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_full_session_flow() {
    let app = create_test_router(vec![]);
    let id = new_session(&app).await;

    for n in 1..=5 {
        let (status, json) = turn(&app, &id, &format!("answer {n}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["reply"], "And then?");
        assert_eq!(json["finalized"], false);
        assert_eq!(json["output"]["useful_turns"], n);
    }

    let (status, json) = turn(&app, &id, "answer 6").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["finalized"], true);
    assert_eq!(json["output"]["progress"], 100);
    assert_eq!(json["score"]["level"], "B2");

    let (status, score) = send(&app, "GET", &format!("/session/{id}/score"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(score["message"], "Good job");

    let (status, session) = send(&app, "GET", &format!("/session/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["state"], "feedback-done");
    assert_eq!(session["phase"], "closed");

    let (status, history) = send(&app, "GET", &format!("/session/{id}/history"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["history"].as_array().unwrap().len(), 7);

    // Closed sessions take no more turns
    let (status, _) = turn(&app, &id, "one more").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_backend_failure_maps_to_bad_gateway() {
    let app = create_test_router(vec![
        Err(SessionError::transport("chat", "HTTP 500")),
        Ok(ChatReply {
            reply: Some("Question?".into()),
            quality: Some(0.9),
            distribution: None,
        }),
    ]);
    let id = new_session(&app).await;

    let (status, _) = turn(&app, &id, "hello").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let (status, _) = turn(&app, &id, "hello").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    // Session is still usable and nothing was scored
    let (status, json) = turn(&app, &id, "hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["output"]["useful_turns"], 1);

    let (_, session) = send(&app, "GET", &format!("/session/{id}"), None).await;
    assert_eq!(session["applied_turns"], 1);
    assert_eq!(session["state"], "listening");
}

#[tokio::test]
async fn test_failed_scoring_is_retried_by_score_route() {
    let app = router_with_score_failures(vec![], 1);
    let id = new_session(&app).await;
    for n in 1..=5 {
        turn(&app, &id, &format!("answer {n}")).await;
    }

    // Closing turn still reports its output
    let (status, json) = turn(&app, &id, "answer 6").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["finalized"], true);
    assert_eq!(json["output"]["progress"], 100);
    assert!(json["score"].is_null());

    let (status, _) = turn(&app, &id, "one more").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, score) = send(&app, "GET", &format!("/session/{id}/score"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(score["level"], "B2");

    let (_, session) = send(&app, "GET", &format!("/session/{id}"), None).await;
    assert_eq!(session["phase"], "closed");
    assert_eq!(session["state"], "feedback-done");
}
