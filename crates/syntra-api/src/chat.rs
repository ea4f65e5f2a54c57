use axum::{Extension, Json, extract::State, http::StatusCode};

use syntra_chat::HistoryEntry;
use syntra_types::api::{ChatRequest, Claims};
use syntra_types::models::ChatMessage;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const MAX_CHAT_MESSAGE_LEN: usize = 1000;

/// Conversations are kept per account and role.
fn session_key(claims: &Claims) -> String {
    format!("{}:{}", claims.sub, claims.role.route_segment())
}

/// GET /chat/welcome
pub async fn welcome(Extension(claims): Extension<Claims>) -> Json<ChatMessage> {
    Json(syntra_chat::ChatResponder::welcome(claims.role))
}

/// POST /chat
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatMessage>> {
    if req.message.trim().is_empty() {
        return Err(ApiError::validation("El mensaje no puede estar vacío"));
    }
    if req.message.chars().count() > MAX_CHAT_MESSAGE_LEN {
        return Err(ApiError::validation("El mensaje es demasiado largo"));
    }

    let reply = state
        .chat
        .respond(&session_key(&claims), claims.role, &req.message)
        .await;
    Ok(Json(reply))
}

/// GET /chat/history: the caller's recent exchanges, oldest first.
pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Json<Vec<HistoryEntry>> {
    Json(state.chat.history(&session_key(&claims)))
}

/// DELETE /chat/history
pub async fn clear_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> StatusCode {
    state.chat.clear(&session_key(&claims));
    StatusCode::NO_CONTENT
}
