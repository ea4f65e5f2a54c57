pub mod auth;
pub mod chat;
pub mod error;
pub mod feedback;
pub mod gateway;
pub mod geocode;
pub mod middleware;
pub mod notifications;
pub mod profile;
pub mod push;
pub mod report_store;
pub mod reports;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    routing::{delete, get, patch, post, put},
};
use serde_json::{Value, json};
use tower_http::services::ServeDir;

use crate::auth::AppState;

/// Photos travel base64-encoded inside report submissions.
const MAX_BODY_SIZE: usize = 48 * 1024 * 1024;

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "online": state.dispatcher.online_count().await,
    }))
}

/// Every HTTP route of the service. Cross-cutting layers (CORS, tracing)
/// are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/register-agent", post(auth::register_agent))
        .route("/auth/login", post(auth::login))
        .route("/auth/login-agent", post(auth::login_agent))
        .route("/gateway", get(gateway::ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/me", get(profile::get_profile).patch(profile::update_profile))
        .route("/me/password", post(profile::change_password))
        .route("/me/device-token", put(profile::set_device_token))
        .route("/reports", post(reports::create_report))
        .route("/reports/mine", get(reports::list_mine))
        .route("/reports/recent", get(reports::list_recent))
        .route("/reports/map", get(reports::list_map))
        .route("/reports/stats", get(reports::stats))
        .route("/reports/{id}", get(reports::get_report).delete(reports::delete_report))
        .route("/reports/{id}/status", patch(reports::update_status))
        .route(
            "/reports/{id}/photos",
            get(reports::list_photos).post(reports::upload_photo),
        )
        .route("/feedback", get(feedback::list_feedback).post(feedback::post_feedback))
        .route("/feedback/{id}", delete(feedback::delete_feedback))
        .route("/chat", post(chat::send_message))
        .route("/chat/welcome", get(chat::welcome))
        .route("/chat/history", get(chat::history).delete(chat::clear_history))
        .route(
            "/notifications",
            get(notifications::list_notifications).delete(notifications::clear_notifications),
        )
        .route("/notifications/test", post(notifications::send_test))
        .route("/geocode", get(geocode::reverse_geocode))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state.clone());

    let blobs = ServeDir::new(state.reports.blob_root());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/blobs", blobs)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
}
