//! HTTP / WebSocket surface (spec §6).
//!
//! Grounded on the teacher's `server.rs` for the axum idiom: a cloneable `AppState`, a thin
//! `ServerError(anyhow::Error)` wrapper convertible to a JSON error response, `TraceLayer` for
//! request logging, and the `ws.on_upgrade(|socket| async move { socket.split() })`
//! sender/receiver pattern for the WebSocket. Route semantics are new — a REST/WS chat-and-
//! approval surface rather than the teacher's voice dashboard.

use std::sync::Arc;

use axum::{
    extract::{ws::Message as WsMessage, ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router as AxumRouter,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::cv_tailor::ParsedCv;
use crate::error::OrchestrationError;
use crate::events::SharedEventBus;
use crate::model::{CvId, SessionId, UserId};
use crate::pipeline::PipelineController;
use crate::quota::QuotaLedger;
use crate::reply_watcher::ReplyWatcher;
use crate::session::SessionStore;
use crate::supervisor::Supervisor;

struct ServerError(OrchestrationError);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

impl From<OrchestrationError> for ServerError {
    fn from(err: OrchestrationError) -> Self {
        Self(err)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub supervisor: Arc<Supervisor>,
    pub sessions: Arc<SessionStore>,
    pub pipeline: Arc<PipelineController>,
    pub quota: Arc<QuotaLedger>,
    pub events: SharedEventBus,
    pub reply_watcher: Arc<ReplyWatcher>,
}

pub async fn run_server(state: AppState, addr: &str) -> anyhow::Result<()> {
    let app = AxumRouter::new()
        .route("/chat", post(post_chat))
        .route("/chat/history/:session_id", get(get_chat_history))
        .route("/cv/upload", post(post_cv_upload))
        .route("/jobs/search", post(post_jobs_search))
        .route("/applications/:id", get(get_application))
        .route("/applications/:id/approve", post(post_application_approve))
        .route("/observability/quota", get(get_observability_quota))
        .route("/observability/gmail-watcher", get(get_observability_watcher))
        .route("/observability/gmail-watcher/toggle", post(post_observability_watcher_toggle))
        .route("/settings/model", get(get_settings_model).post(post_settings_model))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(addr, "starting orchestration server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Deserialize)]
struct ChatRequest {
    user_id: String,
    session_id: String,
    text: String,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Value>,
}

async fn post_chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Result<impl IntoResponse, ServerError> {
    let user_id = UserId::from(req.user_id);
    let session_id = SessionId::from(req.session_id);

    state
        .sessions
        .append(&user_id, &session_id, &crate::model::Message::user(req.text.as_str()))
        .await
        .map_err(|e| OrchestrationError::invariant_violation(e.to_string()))?;

    let (reply, metadata) = state.supervisor.handle_turn(&user_id, &session_id, &req.text).await?;

    state
        .sessions
        .append(&user_id, &session_id, &crate::model::Message::assistant(reply.as_str(), metadata.clone()))
        .await
        .map_err(|e| OrchestrationError::invariant_violation(e.to_string()))?;

    Ok(Json(ChatResponse { reply, metadata: metadata.map(|m| serde_json::to_value(m).unwrap_or_default()) }))
}

async fn get_chat_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    axum::extract::Query(params): axum::extract::Query<std::collections::HashMap<String, String>>,
) -> Result<impl IntoResponse, ServerError> {
    let user_id = UserId::from(params.get("user_id").cloned().unwrap_or_default());
    let session_id = SessionId::from(session_id);
    let history = state
        .sessions
        .last_n(&user_id, &session_id, 100)
        .await
        .map_err(|e| OrchestrationError::invariant_violation(e.to_string()))?;
    Ok(Json(history))
}

#[derive(Deserialize)]
struct CvUploadRequest {
    user_id: String,
    skills: Vec<String>,
    work_experience: Vec<String>,
    education: Vec<String>,
    projects: Vec<String>,
    years_experience: f32,
    has_degree: bool,
}

#[derive(Serialize)]
struct CvUploadResponse {
    cv_id: String,
}

async fn post_cv_upload(State(state): State<AppState>, Json(req): Json<CvUploadRequest>) -> impl IntoResponse {
    let user_id = UserId::from(req.user_id);
    let cv_id = CvId::new();
    let parsed = ParsedCv {
        sections: crate::cv_tailor::CvSections {
            skills: req.skills,
            work_experience: req.work_experience,
            education: req.education,
            projects: req.projects,
        },
        years_experience: req.years_experience,
        has_degree: req.has_degree,
    };
    state.supervisor.set_active_cv(&user_id, cv_id.clone(), parsed).await;
    Json(CvUploadResponse { cv_id: cv_id.0 })
}

#[derive(Deserialize)]
struct JobsSearchRequest {
    user_id: String,
    query: String,
}

async fn post_jobs_search(State(state): State<AppState>, Json(req): Json<JobsSearchRequest>) -> Result<impl IntoResponse, ServerError> {
    let user_id = UserId::from(req.user_id);
    let session_id = SessionId::from("default");
    let (reply, metadata) = state.supervisor.handle_turn(&user_id, &session_id, &req.query).await?;
    Ok(Json(ChatResponse { reply, metadata: metadata.map(|m| serde_json::to_value(m).unwrap_or_default()) }))
}

async fn get_application(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ServerError> {
    let application_id = crate::model::ApplicationId::from(id);
    match state.pipeline.application(&application_id).await {
        Some(app) => Ok(Json(app)),
        None => Err(OrchestrationError::validation("unknown application id").into()),
    }
}

#[derive(Deserialize)]
struct ApproveRequest {
    user_id: String,
    /// Which suspension point this approval resolves: `"cv_review"` or `"email_review"`.
    stage: String,
}

async fn post_application_approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let user_id = UserId::from(req.user_id);
    let application_id = crate::model::ApplicationId::from(id);

    let outcome = match req.stage.as_str() {
        "cv_review" => state.pipeline.approve_cv(&user_id, &application_id).await?,
        "email_review" => state.pipeline.send_email(&user_id, &application_id).await?,
        _ => return Err(OrchestrationError::validation("stage must be cv_review or email_review").into()),
    };

    Ok(Json(serde_json::json!({ "ok": true, "stage": req.stage, "outcome": outcome_label(&outcome) })))
}

fn outcome_label(outcome: &crate::pipeline::PipelineOutcome) -> &'static str {
    use crate::pipeline::PipelineOutcome::*;
    match outcome {
        AskCv { .. } => "ask_cv",
        Suspended { .. } => "suspended",
        Sent { .. } => "sent",
        Aborted { .. } => "aborted",
    }
}

async fn get_observability_quota(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.quota.all_status())
}

async fn get_observability_watcher(State(state): State<AppState>) -> impl IntoResponse {
    let (checks, replies) = state.reply_watcher.stats_snapshot().await;
    Json(serde_json::json!({ "total_checks": checks, "replies_detected": replies }))
}

async fn post_observability_watcher_toggle(State(state): State<AppState>, Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    let enable = body.get("enable").and_then(|v| v.as_bool()).unwrap_or(true);
    if enable {
        state.reply_watcher.start().await;
    } else {
        state.reply_watcher.stop().await;
    }
    Json(serde_json::json!({ "enabled": enable }))
}

#[derive(Serialize)]
struct ModelSettingsResponse {
    default_model: String,
}

async fn get_settings_model(State(state): State<AppState>) -> impl IntoResponse {
    Json(ModelSettingsResponse { default_model: state.config.default_model.clone() })
}

#[derive(Deserialize)]
struct ModelSettingsRequest {
    model: String,
}

async fn post_settings_model(Json(req): Json<ModelSettingsRequest>) -> impl IntoResponse {
    // The active model preference is per-request (`preferred_model` on `Router::invoke`), not a
    // mutable global — this endpoint only validates the name is one of the known chain entries.
    let known = crate::llm::FALLBACK_CHAIN.iter().any(|e| e.model_id == req.model) || req.model == "auto";
    if known {
        (StatusCode::OK, Json(serde_json::json!({ "model": req.model })))
    } else {
        (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "unknown model id" })))
    }
}

/// Bearer-token-first-frame auth (spec §6): the client's first WS frame must be the bearer token;
/// anything else closes the connection before any event is relayed.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| async move {
        let (mut sender, mut receiver) = socket.split();

        let Some(Ok(WsMessage::Text(token))) = receiver.next().await else {
            let _ = sender.send(WsMessage::Close(None)).await;
            return;
        };
        if token.trim().is_empty() || token.trim() != state.config.secret_key {
            warn!("websocket client sent an invalid bearer token, closing");
            let _ = sender.send(WsMessage::Close(None)).await;
            return;
        }

        let user_id = UserId::from("default");
        let user_id_for_ping = user_id.clone();
        let mut subscription = state.events.subscribe(user_id).await;

        let forward = tokio::spawn(async move {
            while let Some(event) = subscription.receiver.recv().await {
                let frame = serde_json::json!({ "type": event_tag(&event), "data": event });
                if sender.send(WsMessage::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
        });

        while let Some(msg) = receiver.next().await {
            match msg {
                // Inbound "ping" text frame -> outbound "pong" event (spec §6), distinct from the
                // WebSocket protocol-level Ping/Pong control frames below.
                Ok(WsMessage::Text(text)) if text.trim() == "ping" => {
                    state.events.emit(&user_id_for_ping, crate::events::AgentEvent::Pong).await;
                }
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Text(_)) => continue,
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            }
        }

        forward.abort();
    })
}

fn event_tag(event: &crate::events::AgentEvent) -> &'static str {
    use crate::events::AgentEvent::*;
    match event {
        AgentStarted { .. } => "agent_started",
        AgentProgress { .. } => "agent_progress",
        AgentCompleted { .. } => "agent_completed",
        AgentError { .. } => "agent_error",
        LogEntry { .. } => "log_entry",
        WorkflowUpdate { .. } => "workflow_update",
        ApprovalRequested { .. } => "approval_requested",
        Pong => "pong",
    }
}
