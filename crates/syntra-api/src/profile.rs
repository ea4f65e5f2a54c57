use axum::{Extension, Json, extract::State, http::StatusCode};
use tracing::info;
use uuid::Uuid;

use syntra_db::models::UserRow;
use syntra_db::parse_timestamp;
use syntra_types::api::{ChangePasswordRequest, Claims, DeviceTokenRequest, UpdateProfileRequest};
use syntra_types::models::{Role, UserProfile};

use crate::auth::{
    AppState, MIN_PASSWORD_LEN, email_taken_on_insert, hash_password, normalize_email,
    verify_password,
};
use crate::error::{ApiError, ApiResult};

async fn current_user(state: &AppState, user_id: Uuid) -> ApiResult<UserRow> {
    let uid = user_id.to_string();
    state
        .blocking(move |db| db.get_user_by_id(&uid))
        .await?
        .ok_or(ApiError::Unauthorized)
}

async fn load_profile(state: &AppState, user_id: Uuid) -> ApiResult<UserProfile> {
    let user = current_user(state, user_id).await?;
    let uid = user.id.clone();
    let agent = state.blocking(move |db| db.get_agent_profile(&uid)).await?;

    Ok(UserProfile {
        id: user_id,
        email: user.email,
        username: user.username,
        role: Role::parse(&user.role).unwrap_or(Role::Citizen),
        document: agent.as_ref().map(|a| a.document.clone()),
        plate: agent.map(|a| a.plate),
        created_at: parse_timestamp(&user.created_at),
    })
}

/// GET /me
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(load_profile(&state, claims.sub).await?))
}

/// PATCH /me
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let user = current_user(&state, claims.sub).await?;

    let username = match req.username {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::validation("El nombre de usuario es obligatorio"));
        }
        Some(name) => name.trim().to_string(),
        None => user.username,
    };

    let email = match req.email {
        Some(email) => {
            let email = normalize_email(&email);
            if email.is_empty() || !email.contains('@') {
                return Err(ApiError::validation("El correo no es válido"));
            }
            if email != user.email {
                let lookup = email.clone();
                if state
                    .blocking(move |db| db.get_user_by_email(&lookup))
                    .await?
                    .is_some()
                {
                    return Err(ApiError::Conflict("El correo ya está registrado".into()));
                }
            }
            email
        }
        None => user.email,
    };

    let uid = user.id;
    state
        .blocking(move |db| db.update_user_profile(&uid, &username, &email))
        .await
        .map_err(email_taken_on_insert)?;

    Ok(Json(load_profile(&state, claims.sub).await?))
}

/// POST /me/password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let user = current_user(&state, claims.sub).await?;
    verify_password(&req.current_password, &user.password)?;
    if req.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "La contraseña debe tener al menos {} caracteres",
            MIN_PASSWORD_LEN
        )));
    }

    let hash = hash_password(&req.new_password)?;
    let uid = user.id;
    state.blocking(move |db| db.update_password(&uid, &hash)).await?;

    info!("User {} changed password", claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /me/device-token
pub async fn set_device_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeviceTokenRequest>,
) -> ApiResult<StatusCode> {
    let token = req.token.trim().to_string();
    if token.is_empty() {
        return Err(ApiError::validation("El token del dispositivo es obligatorio"));
    }

    let uid = claims.sub.to_string();
    let updated = state
        .blocking(move |db| db.set_device_token(&uid, &token))
        .await?;
    if !updated {
        return Err(ApiError::Unauthorized);
    }
    Ok(StatusCode::NO_CONTENT)
}
