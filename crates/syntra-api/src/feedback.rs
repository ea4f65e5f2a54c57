use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use syntra_db::models::FeedbackRow;
use syntra_db::{parse_timestamp, timestamp};
use syntra_types::api::{Claims, FeedbackRequest};
use syntra_types::events::GatewayEvent;
use syntra_types::models::{FeedbackComment, Role};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct FeedbackQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

fn to_comment(row: FeedbackRow) -> FeedbackComment {
    FeedbackComment {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt feedback id '{}': {}", row.id, e);
            Uuid::default()
        }),
        author_id: row.author_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt author_id '{}' on feedback '{}': {}", row.author_id, row.id, e);
            Uuid::default()
        }),
        author_name: row.author_name,
        message: row.message,
        created_at: parse_timestamp(&row.created_at),
    }
}

/// POST /feedback: citizens only.
pub async fn post_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FeedbackRequest>,
) -> ApiResult<impl IntoResponse> {
    if claims.role != Role::Citizen {
        return Err(ApiError::forbidden(
            "El módulo de feedback está reservado para los ciudadanos",
        ));
    }
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::validation("El comentario no puede estar vacío"));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(ApiError::validation("El comentario es demasiado largo"));
    }

    // Display name comes from the account, not the token, so renames show up
    let uid = claims.sub.to_string();
    let author_name = state
        .blocking(move |db| db.get_user_by_id(&uid))
        .await?
        .map(|u| u.username)
        .ok_or(ApiError::Unauthorized)?;

    let row = FeedbackRow {
        id: Uuid::new_v4().to_string(),
        author_id: claims.sub.to_string(),
        author_name,
        message,
        created_at: timestamp(Utc::now()),
    };
    let comment = to_comment(row.clone());
    state.blocking(move |db| db.insert_feedback(&row)).await?;

    info!("Feedback {} posted by {}", comment.id, claims.sub);
    state.dispatcher.broadcast(GatewayEvent::FeedbackCreated {
        comment: comment.clone(),
    });

    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /feedback, newest first.
pub async fn list_feedback(
    State(state): State<AppState>,
    Query(query): Query<FeedbackQuery>,
) -> ApiResult<Json<Vec<FeedbackComment>>> {
    let limit = query.limit.clamp(1, 500);
    let rows = state.blocking(move |db| db.list_feedback(limit)).await?;
    Ok(Json(rows.into_iter().map(to_comment).collect()))
}

/// DELETE /feedback/{id}: only the author may remove a comment.
pub async fn delete_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let fid = id.to_string();
    let row = state
        .blocking(move |db| db.get_feedback(&fid))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("feedback {}", id)))?;

    if row.author_id != claims.sub.to_string() {
        return Err(ApiError::forbidden("Solo el autor puede eliminar este comentario"));
    }

    let fid = id.to_string();
    state.blocking(move |db| db.delete_feedback(&fid)).await?;
    state.dispatcher.broadcast(GatewayEvent::FeedbackDeleted { id });
    Ok(StatusCode::NO_CONTENT)
}
