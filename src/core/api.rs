//! HTTP + WebSocket API for placement sessions
//!
//! Endpoints:
//! - POST /session/new - Create session, returns the greeting
//! - GET /session/{id} - Get session status
//! - POST /session/{id}/turn - Submit a user utterance
//! - GET /session/{id}/history - Turn history
//! - GET /session/{id}/score - Final score once closed (retries a failed scoring)
//! - WS /ws/{id} - Live session events
//! - GET /health - Health check

use axum::{
    extract::{Path, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::core::persistence::MemoryStore;
use crate::core::turn_controller::{
    Capabilities, Session, SessionEvent, SessionStatus, TurnController, TurnOutcome,
};
use crate::error::SessionError;
use crate::types::{FinalScore, SelfReportedLevel, TurnHistory, TurnOutput, UserProfile};

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, Arc<Mutex<TurnController>>>>,
    pub config: SessionConfig,
    pub capabilities: Capabilities,
}

/// Create new session request
#[derive(Debug, Deserialize)]
pub struct NewSessionRequest {
    pub name: String,
    pub language: String,
    pub situation: String,
    #[serde(default)]
    pub level: Option<String>,
}

/// Create new session response
#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
    pub greeting: String,
    pub status: SessionStatus,
}

/// Session status response
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub status: SessionStatus,
    pub pending_prompt: Option<String>,
}

/// Submit turn request
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

/// Submit turn response
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub reply: Option<String>,
    pub output: Option<TurnOutput>,
    pub finalized: bool,
    pub score: Option<FinalScore>,
}

/// History response
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub history: TurnHistory,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
}

/// Create the API router
pub fn create_router(config: SessionConfig, capabilities: Capabilities) -> Router {
    let state = Arc::new(AppState {
        sessions: RwLock::new(HashMap::new()),
        config,
        capabilities,
    });

    Router::new()
        .route("/health", get(health))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session))
        .route("/session/:id/turn", post(submit_turn))
        .route("/session/:id/history", get(get_history))
        .route("/session/:id/score", get(get_score))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// HTTP status for a session error
pub fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::Finalized | SessionError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SessionError::Transport { .. } | SessionError::MalformedResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
        SessionError::ResourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Persistence(_) | SessionError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: sessions.len(),
    })
}

async fn lookup(state: &AppState, id: &str) -> Result<Arc<Mutex<TurnController>>, StatusCode> {
    let sessions = state.sessions.read().await;
    sessions.get(id).cloned().ok_or(StatusCode::NOT_FOUND)
}

/// Create new session
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, StatusCode> {
    let level = req
        .level
        .as_deref()
        .map(SelfReportedLevel::parse)
        .unwrap_or_default();
    let profile = UserProfile::new(req.name, req.language, req.situation, level);
    if !profile.is_complete() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let session = Session::new(profile, state.config.clone(), Arc::new(MemoryStore::new()));
    let mut controller = TurnController::new(session, state.capabilities.clone());
    let greeting = controller.open().await.map_err(|e| status_for(&e))?;
    let status = controller.session().status();

    let session_id = format!("session_{}", Uuid::new_v4().simple());
    let mut sessions = state.sessions.write().await;
    sessions.insert(session_id.clone(), Arc::new(Mutex::new(controller)));
    info!(session = %session_id, "session created");

    Ok(Json(NewSessionResponse {
        session_id: session_id.clone(),
        websocket_url: format!("/ws/{}", session_id),
        greeting,
        status,
    }))
}

/// Get session status
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, StatusCode> {
    let controller = lookup(&state, &id).await?;
    let controller = controller.lock().await;
    let session = controller.session();

    Ok(Json(SessionStatusResponse {
        session_id: id,
        status: session.status(),
        pending_prompt: session.pending_prompt().map(str::to_string),
    }))
}

/// Submit a user utterance
async fn submit_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, StatusCode> {
    if req.text.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let controller = lookup(&state, &id).await?;
    let mut controller = controller.lock().await;

    let outcome = controller.run_turn(req.text.trim()).await.map_err(|e| {
        warn!(session = %id, error = %e, "turn failed");
        status_for(&e)
    })?;
    let session = controller.session();

    Ok(Json(TurnResponse {
        reply: outcome.reply().map(str::to_string),
        output: outcome.output().cloned(),
        finalized: matches!(outcome, TurnOutcome::Finalize { .. }) || session.is_finalized(),
        score: session.score().cloned(),
    }))
}

/// Turn history
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let controller = lookup(&state, &id).await?;
    let controller = controller.lock().await;
    Ok(Json(HistoryResponse {
        session_id: id,
        history: controller.session().history().clone(),
    }))
}

/// Final score. A session that stopped without a score retries scoring here.
async fn get_score(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FinalScore>, StatusCode> {
    let controller = lookup(&state, &id).await?;
    let mut controller = controller.lock().await;
    if let Some(score) = controller.session().score() {
        return Ok(Json(score.clone()));
    }
    if !controller.session().is_finalized() {
        return Err(StatusCode::NOT_FOUND);
    }
    let score = controller.finalize().await.map_err(|e| {
        warn!(session = %id, error = %e, "scoring retry failed");
        status_for(&e)
    })?;
    Ok(Json(score))
}

/// WebSocket handler for live updates
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let controller = lookup(&state, &id).await?;
    let rx = controller.lock().await.session().subscribe();

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<SessionEvent>) {
    let (mut sender, mut receiver) = socket.split();

    let mut forward = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "event not serializable");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Clients only listen; drain until they hang up
    let mut inbound = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut forward => inbound.abort(),
        _ = &mut inbound => forward.abort(),
    }
}

/// Run the API server
pub async fn run_server(
    addr: &str,
    config: SessionConfig,
    capabilities: Capabilities,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(config, capabilities);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "levelbot API listening");
    info!("POST /session/new | GET /session/:id | POST /session/:id/turn | GET /session/:id/history | GET /session/:id/score | WS /ws/:id | GET /health");
    axum::serve(listener, router).await?;
    Ok(())
}
