use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Report, ReportStatus, Role};

// -- JWT Claims --

/// JWT claims shared across syntra-api (REST middleware) and syntra-gateway
/// (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterAgentRequest {
    pub email: String,
    pub password: String,
    pub document: String,
    pub plate: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Profile --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceTokenRequest {
    pub token: String,
}

// -- Reports --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReportRequest {
    pub address: String,
    pub description: String,
    /// Label picked in the client ("Operativo", "Inspección", "Falla crítico").
    pub status: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Base64-encoded JPEG bytes, uploaded after the report is created.
    #[serde(default)]
    pub photos: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReportResponse {
    pub id: Uuid,
    pub photo_urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateStatusResponse {
    pub id: Uuid,
    pub status: ReportStatus,
    pub status_label: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadPhotoResponse {
    pub report_id: Uuid,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportList {
    pub reports: Vec<Report>,
}

// -- Feedback --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedbackRequest {
    pub message: String,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    pub message: String,
}

// -- Geocoding --

#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeocodeResponse {
    pub address: String,
    /// False when the lookup failed and `address` holds raw coordinates.
    pub resolved: bool,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
