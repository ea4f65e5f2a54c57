use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use syntra_chat::ChatResponder;
use syntra_db::Database;
use syntra_db::models::UserRow;
use syntra_gateway::Dispatcher;
use syntra_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterAgentRequest, RegisterRequest, RegisterResponse,
};
use syntra_types::models::Role;

use crate::error::{ApiError, ApiResult};
use crate::geocode::Geocoder;
use crate::notifications::Notifier;
use crate::report_store::ReportStore;

pub const MIN_PASSWORD_LEN: usize = 6;
const TOKEN_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub reports: ReportStore,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub chat: ChatResponder,
    pub notifier: Notifier,
    pub geocoder: Option<Arc<dyn Geocoder>>,
}

impl AppStateInner {
    /// Run a query off the async runtime.
    pub async fn blocking<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }

    pub async fn device_token(&self, user_id: Uuid) -> ApiResult<Option<String>> {
        let uid = user_id.to_string();
        let user = self.blocking(move |db| db.get_user_by_id(&uid)).await?;
        Ok(user.and_then(|u| u.device_token))
    }
}

pub(crate) fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
}

pub(crate) fn verify_password(password: &str, hash: &str) -> ApiResult<()> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt password hash: {}", e)))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::Unauthorized)
}

pub(crate) fn validate_credentials(email: &str, password: &str) -> ApiResult<()> {
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::validation("El correo no es válido"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "La contraseña debe tener al menos {} caracteres",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn ensure_email_free(state: &AppState, email: &str) -> ApiResult<()> {
    let email = email.to_string();
    if state
        .blocking(move |db| db.get_user_by_email(&email))
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("El correo ya está registrado".into()));
    }
    Ok(())
}

/// The email check and the insert are separate steps, so a concurrent
/// registration can still trip the UNIQUE index. Report that as a conflict.
pub(crate) fn email_taken_on_insert(err: ApiError) -> ApiError {
    match err {
        ApiError::Internal(e) if syntra_db::is_constraint_violation(&e) => {
            ApiError::Conflict("El correo ya está registrado".into())
        }
        other => other,
    }
}

fn new_user(email: String, username: String, password_hash: String, role: Role) -> UserRow {
    UserRow {
        id: Uuid::new_v4().to_string(),
        email,
        username,
        password: password_hash,
        role: role.as_str().to_string(),
        device_token: None,
        created_at: syntra_db::timestamp(Utc::now()),
    }
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = normalize_email(&req.email);
    let username = req.username.trim().to_string();
    validate_credentials(&email, &req.password)?;
    if username.is_empty() {
        return Err(ApiError::validation("El nombre de usuario es obligatorio"));
    }
    ensure_email_free(&state, &email).await?;

    let user = new_user(email, username, hash_password(&req.password)?, Role::Citizen);
    let user_id: Uuid = user.id.parse().map_err(anyhow::Error::from)?;
    let token = create_token(&state.jwt_secret, user_id, &user.username, Role::Citizen)?;

    info!("Citizen {} registered", user_id);
    state
        .blocking(move |db| db.create_user(&user))
        .await
        .map_err(email_taken_on_insert)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

/// POST /auth/register-agent
pub async fn register_agent(
    State(state): State<AppState>,
    Json(req): Json<RegisterAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = normalize_email(&req.email);
    validate_credentials(&email, &req.password)?;
    let document = req.document.trim().to_string();
    let plate = req.plate.trim().to_uppercase();
    if document.is_empty() || plate.is_empty() {
        return Err(ApiError::validation("Documento y placa son obligatorios"));
    }
    ensure_email_free(&state, &email).await?;

    // Agents sign up without a display name; the mailbox name stands in.
    let username = email.split('@').next().unwrap_or_default().to_string();
    let user = new_user(email, username, hash_password(&req.password)?, Role::Agent);
    let user_id: Uuid = user.id.parse().map_err(anyhow::Error::from)?;
    let token = create_token(&state.jwt_secret, user_id, &user.username, Role::Agent)?;

    info!("Agent {} registered", user_id);
    state
        .blocking(move |db| db.create_agent(&user, &document, &plate))
        .await
        .map_err(email_taken_on_insert)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

async fn authenticate(state: &AppState, req: LoginRequest) -> ApiResult<(UserRow, Uuid, Role)> {
    let email = normalize_email(&req.email);
    let user = state
        .blocking(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    verify_password(&req.password, &user.password)?;

    let user_id: Uuid = user.id.parse().map_err(anyhow::Error::from)?;
    let role = Role::parse(&user.role).unwrap_or_else(|| {
        warn!("Unknown role '{}' on user {}", user.role, user.id);
        Role::Citizen
    });
    Ok((user, user_id, role))
}

fn login_response(state: &AppState, user: UserRow, user_id: Uuid, role: Role) -> ApiResult<LoginResponse> {
    let token = create_token(&state.jwt_secret, user_id, &user.username, role)?;
    Ok(LoginResponse {
        user_id,
        username: user.username,
        role,
        token,
    })
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let (user, user_id, role) = authenticate(&state, req).await?;
    Ok(Json(login_response(&state, user, user_id, role)?))
}

/// POST /auth/login-agent: only accounts with an agent profile get in.
pub async fn login_agent(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let (user, user_id, _) = authenticate(&state, req).await?;

    let uid = user.id.clone();
    let profile = state.blocking(move |db| db.get_agent_profile(&uid)).await?;
    if profile.is_none() {
        return Err(ApiError::forbidden("Tu cuenta no está habilitada como agente"));
    }

    Ok(Json(login_response(&state, user, user_id, Role::Agent)?))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: (Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_token;

    #[test]
    fn token_round_trip() {
        let id = Uuid::new_v4();
        let token = create_token("secret", id, "ana", Role::Agent).unwrap();

        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.username, "ana");
        assert_eq!(claims.role, Role::Agent);
        assert!(decode_token("other-secret", &token).is_none());
    }

    #[test]
    fn password_hashing() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).is_ok());
        assert!(matches!(verify_password("wrong", &hash), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn racing_insert_maps_to_conflict() {
        let db = Database::open_in_memory().unwrap();
        let first = new_user("ana@syntra.co".into(), "Ana".into(), "hash".into(), Role::Citizen);
        let second = new_user("ana@syntra.co".into(), "Otra".into(), "hash".into(), Role::Citizen);
        db.create_user(&first).unwrap();

        // Both passed the lookup; the second insert hits the UNIQUE index
        let err = ApiError::from(db.create_user(&second).unwrap_err());
        assert!(matches!(email_taken_on_insert(err), ApiError::Conflict(_)));

        let other = ApiError::from(anyhow::anyhow!("disk full"));
        assert!(matches!(email_taken_on_insert(other), ApiError::Internal(_)));
    }

    #[test]
    fn credential_rules() {
        assert!(validate_credentials("ana@syntra.co", "123456").is_ok());
        assert!(validate_credentials("ana@syntra.co", "12345").is_err());
        assert!(validate_credentials("", "123456").is_err());
        assert_eq!(normalize_email("  Ana@Syntra.CO "), "ana@syntra.co");
    }
}
