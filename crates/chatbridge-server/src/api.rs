use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use chatbridge_gateway::{EventGateway, Outcome, SendRequest};
use chatbridge_shared::constants::DEFAULT_MESSAGE_LIMIT;
use chatbridge_shared::protocol::HistorySync;
use chatbridge_shared::{Jid, MediaKind, MessageEvent, Node};
use chatbridge_store::{Chat, StoredMessage};

use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<EventGateway>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/chats", get(list_chats))
        .route("/api/messages", get(list_messages))
        .route("/api/download", post(download_media))
        .route("/api/media-base64", get(media_base64))
        .route("/api/send", post(send_message))
        .route("/api/events", post(ingest_event))
        .route("/api/history", post(ingest_history))
        .route("/api/nodes", post(deliver_node))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct MessagesQuery {
    chat_jid: Option<String>,
    limit: Option<String>,
}

#[derive(Serialize)]
struct MessagesResponse {
    success: bool,
    messages: Vec<StoredMessage>,
}

#[derive(Deserialize)]
struct DownloadRequest {
    message_id: String,
    chat_jid: String,
}

#[derive(Serialize)]
struct DownloadResponse {
    success: bool,
    message: String,
    filename: String,
    path: String,
}

#[derive(Deserialize)]
struct MediaQuery {
    chat_jid: Option<String>,
    filename: Option<String>,
}

#[derive(Serialize)]
struct MediaBase64Response {
    success: bool,
    filename: String,
    base64: String,
    mime_type: &'static str,
}

#[derive(Serialize)]
struct SendResponse {
    success: bool,
    message: String,
    id: String,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct HistoryResponse {
    stored: usize,
}

#[derive(Serialize)]
struct NodeResponse {
    delivered: bool,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_chats(State(state): State<AppState>) -> Result<Json<Vec<Chat>>, ServerError> {
    Ok(Json(state.gateway.list_chats()?))
}

async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ServerError> {
    let chat = required(query.chat_jid, "chat_jid")?;
    let limit = match query.limit.as_deref() {
        None | Some("") => DEFAULT_MESSAGE_LIMIT,
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
            Ok(_) => DEFAULT_MESSAGE_LIMIT,
            Err(_) => {
                return Err(ServerError::BadRequest(
                    "limit must be a positive number".into(),
                ))
            }
        },
    };

    let messages = state
        .gateway
        .list_messages(&Jid::new(chat), limit)
        .map_err(|e| match ServerError::from(e) {
            ServerError::NotFound(_) => ServerError::NotFound("chat not found".into()),
            other => other,
        })?;
    Ok(Json(MessagesResponse {
        success: true,
        messages,
    }))
}

async fn download_media(
    State(state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>, ServerError> {
    if req.message_id.is_empty() || req.chat_jid.is_empty() {
        return Err(ServerError::BadRequest(
            "message_id and chat_jid are required".into(),
        ));
    }

    let media = state
        .gateway
        .download(&req.message_id, &Jid::new(req.chat_jid.as_str()))
        .await?;
    let message = if media.downloaded {
        format!("Downloaded {} media", media.kind)
    } else {
        format!("{} media already cached", media.kind)
    };

    Ok(Json(DownloadResponse {
        success: true,
        message,
        filename: media.filename,
        path: media.path.display().to_string(),
    }))
}

async fn media_base64(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
) -> Result<Json<MediaBase64Response>, ServerError> {
    let chat = required(query.chat_jid, "chat_jid")?;
    let filename = required(query.filename, "filename")?;

    let path = state
        .gateway
        .media_by_filename(&Jid::new(chat), &filename)
        .await?;
    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to read {}: {e}", path.display())))?;

    let ext = filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    let (_, mime_type) = MediaKind::from_extension(ext);
    info!(filename = %filename, bytes = data.len(), "encoded media as base64");

    Ok(Json(MediaBase64Response {
        success: true,
        base64: base64::engine::general_purpose::STANDARD.encode(&data),
        filename,
        mime_type,
    }))
}

async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, ServerError> {
    let outcome = state.gateway.send(&req).await?;
    Ok(Json(SendResponse {
        success: true,
        message: format!("Message sent to {}", outcome.recipient),
        id: outcome.id,
        timestamp: outcome.timestamp,
    }))
}

async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<MessageEvent>,
) -> Result<Json<Outcome>, ServerError> {
    Ok(Json(state.gateway.handle_message(&event).await?))
}

async fn ingest_history(
    State(state): State<AppState>,
    Json(sync): Json<HistorySync>,
) -> Result<Json<HistoryResponse>, ServerError> {
    let stored = state.gateway.handle_history_sync(&sync).await?;
    Ok(Json(HistoryResponse { stored }))
}

async fn deliver_node(
    State(state): State<AppState>,
    Json(node): Json<Node>,
) -> Json<NodeResponse> {
    Json(NodeResponse {
        delivered: state.gateway.deliver_node(node),
    })
}

fn required(value: Option<String>, name: &str) -> Result<String, ServerError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::BadRequest(format!("Missing required parameter: {name}")))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
