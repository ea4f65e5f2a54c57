use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;

use syntra_gateway::connection;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::decode_token;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// GET /gateway?token=..: the JWT is validated before the upgrade so that
/// unauthenticated sockets are never opened.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    let token = query.token.ok_or(ApiError::Unauthorized)?;
    let claims = decode_token(&state.jwt_secret, &token).ok_or_else(|| {
        warn!("Gateway upgrade rejected: invalid token");
        ApiError::Unauthorized
    })?;

    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, claims.sub, claims.username)
    }))
}
