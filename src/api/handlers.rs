//! HTTP request handlers

use super::types::{
    ChatRequest, CreateConversationRequest, ErrorResponse, SuccessResponse, GUEST_MODE_HEADER,
};
use super::AppState;
use crate::db::{Conversation, ConversationId, ConversationWithMessages, DEFAULT_CONVERSATION_TITLE};
use crate::store::{ConversationStore, StoreError};
use crate::transport::{ChatTransport, Exchange, TransportError, TransportErrorKind};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Conversations
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        // Chat
        .route("/api/chat", post(send_chat))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Conversation Handlers
// ============================================================

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, AppError> {
    let conversations = state.storage.list_conversations().await?;
    Ok(Json(conversations))
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<Conversation>, AppError> {
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_CONVERSATION_TITLE);

    let conversation = state.storage.create_conversation(title).await?;
    tracing::info!(conv_id = %conversation.id, title = %conversation.title, "Created conversation");
    Ok(Json(conversation))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationWithMessages>, AppError> {
    let id = parse_id(&id)?;
    state
        .storage
        .get_conversation(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {id}")))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    let id = parse_id(&id)?;
    if !state.storage.delete_conversation(id).await? {
        return Err(AppError::NotFound(format!("Conversation not found: {id}")));
    }
    tracing::info!(conv_id = %id, "Deleted conversation");
    Ok(Json(SuccessResponse { success: true }))
}

fn parse_id(raw: &str) -> Result<ConversationId, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid conversation id: {raw}")))
}

// ============================================================
// Chat Handler
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Exchange>, AppError> {
    if req.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".to_string()));
    }

    let guest = headers
        .get(GUEST_MODE_HEADER)
        .is_some_and(|v| v.as_bytes() == b"true");
    tracing::info!(conv_id = %req.conversation_id, guest, "Chat message received");

    let exchange = state
        .transport
        .exchange(req.conversation_id, &req.message)
        .await?;
    Ok(Json(exchange))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("help-ai ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConversationNotFound(id) => {
                AppError::NotFound(format!("Conversation not found: {id}"))
            }
            other => {
                tracing::error!(error = %other, "Storage failure");
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        match e.kind {
            TransportErrorKind::NotFound => AppError::NotFound(e.message),
            TransportErrorKind::InvalidRequest => AppError::BadRequest(e.message),
            TransportErrorKind::Upstream
            | TransportErrorKind::Network
            | TransportErrorKind::Timeout => AppError::BadGateway(e.message),
            TransportErrorKind::Unknown => AppError::Internal(e.message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
