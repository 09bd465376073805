use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::Method;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use wabridge_proto::Transport;
use wabridge_store::{MessageStore, SessionBackend};

use crate::download;
use crate::error::{ApiError, ApiJson, ErrorKind};
use crate::health::{BridgeHealth, HealthState};
use crate::pages;
use crate::qr::QrState;
use crate::send::SendEngine;

#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<MessageStore>,
    pub session: Arc<SessionBackend>,
    pub health: Arc<HealthState>,
    pub qr: Arc<QrState>,
    pub send: Arc<SendEngine>,
    pub media_root: PathBuf,
    pub backup_note: &'static str,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/send", post(api_send))
        .route("/api/download", post(api_download))
        .route("/api/status", get(api_status))
        .route("/api/auth-status", get(api_auth_status))
        .route("/api/session-backend", get(api_session_backend))
        .route("/qr", get(qr_page))
        .route("/status", get(status_page))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    // Deliberately independent of WhatsApp connectivity: probes use this to
    // tell "process up" from "bridge authenticated".
    "OK"
}

#[derive(Deserialize)]
struct SendRequest {
    recipient: String,
    message: Option<String>,
    file_path: Option<String>,
    /// Alias kept for older agent clients.
    media_path: Option<String>,
    audio: Option<String>,
}

#[derive(Serialize)]
struct SendResponse {
    success: bool,
    message_id: String,
}

async fn api_send(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    if request.recipient.trim().is_empty() {
        return Err(ApiError::with_detail(
            ErrorKind::InvalidRequest,
            "recipient is required",
        ));
    }

    let file = request.file_path.or(request.media_path);
    let set = [
        request.message.is_some(),
        file.is_some(),
        request.audio.is_some(),
    ]
    .iter()
    .filter(|&&s| s)
    .count();
    if set != 1 {
        return Err(ApiError::with_detail(
            ErrorKind::InvalidRequest,
            "exactly one of message, file_path or audio must be set",
        ));
    }

    let message_id = if let Some(text) = request.message {
        state.send.send_text(&request.recipient, &text).await?
    } else if let Some(path) = file {
        state.send.send_file(&request.recipient, &path).await?
    } else if let Some(path) = request.audio {
        state.send.send_voice(&request.recipient, &path).await?
    } else {
        unreachable!("validated above");
    };

    Ok(Json(SendResponse {
        success: true,
        message_id,
    }))
}

#[derive(Deserialize)]
struct DownloadRequest {
    message_id: String,
    chat_jid: String,
}

#[derive(Serialize)]
struct DownloadResponse {
    success: bool,
    file_path: String,
    /// Alias kept for older agent clients.
    path: String,
}

async fn api_download(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DownloadRequest>,
) -> Result<Json<DownloadResponse>, ApiError> {
    if request.message_id.is_empty() || request.chat_jid.is_empty() {
        return Err(ApiError::with_detail(
            ErrorKind::InvalidRequest,
            "message_id and chat_jid are required",
        ));
    }

    let path = download::download_media(
        &state.store,
        &state.transport,
        &state.media_root,
        &request.message_id,
        &request.chat_jid,
    )
    .await?;

    let path = path.display().to_string();
    Ok(Json(DownloadResponse {
        success: true,
        file_path: path.clone(),
        path,
    }))
}

/// Assemble the derived health view. Always 200 so callers can tell "bridge
/// down" (no response) from "bridge up but unhealthy".
pub async fn bridge_health(state: &AppState) -> BridgeHealth {
    let messages_db_ok = state.store.reachable().await;
    let sessions_db_ok = state.session.reachable().await;

    let chats = state.store.count_chats().await.unwrap_or(0);
    let messages = state.store.count_messages().await.unwrap_or(0);
    let db_size_bytes = state.store.size_bytes().await.unwrap_or(0);

    let connected = state.health.is_connected() && state.transport.is_connected();
    BridgeHealth {
        ready: connected && messages_db_ok && sessions_db_ok,
        running: true,
        authenticated: state.health.is_authenticated(),
        connected,
        messages_db_ok,
        sessions_db_ok,
        chats,
        messages,
        db_size_bytes,
        event_errors: state.health.event_errors(),
        last_sync_at: state.health.last_sync_at().await,
        last_error: state.health.last_error().await,
        backup: state.backup_note,
    }
}

async fn api_status(State(state): State<AppState>) -> Json<BridgeHealth> {
    Json(bridge_health(&state).await)
}

#[derive(Serialize)]
struct AuthStatusResponse {
    authenticated: bool,
    has_qr_code: bool,
}

async fn api_auth_status(State(state): State<AppState>) -> Json<AuthStatusResponse> {
    Json(AuthStatusResponse {
        authenticated: state.health.is_authenticated(),
        has_qr_code: state.qr.has_code().await,
    })
}

#[derive(Serialize)]
struct SessionBackendResponse {
    backend: &'static str,
    session_tables_ok: bool,
    session_host: String,
    message_backend: &'static str,
    message_tables_ok: bool,
    errors: Vec<String>,
}

async fn api_session_backend(State(state): State<AppState>) -> Json<SessionBackendResponse> {
    let mut errors = Vec::new();
    if !state.session.reachable().await {
        errors.push("session backend unreachable".to_string());
    }
    if !state.store.reachable().await {
        errors.push("message backend unreachable".to_string());
    }
    if let Some(last) = state.health.last_error().await {
        errors.push(last.message);
    }

    Json(SessionBackendResponse {
        backend: state.session.backend_kind(),
        session_tables_ok: state.session.tables_ok(),
        session_host: state.session.host(),
        message_backend: state.store.backend_kind(),
        message_tables_ok: true,
        errors,
    })
}

async fn qr_page(State(state): State<AppState>) -> Html<String> {
    Html(pages::qr_page(
        state.health.is_authenticated(),
        state.qr.latest().await,
    ))
}

async fn status_page() -> Html<&'static str> {
    Html(pages::STATUS_PAGE)
}
