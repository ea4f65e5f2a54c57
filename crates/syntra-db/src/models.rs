//! Database row types. These map directly to SQLite rows and are kept
//! separate from the syntra-types API models.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: String,
    pub device_token: Option<String>,
    pub created_at: String,
}

pub struct AgentProfileRow {
    pub user_id: String,
    pub document: String,
    pub plate: String,
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: String,
    pub reporter_id: String,
    pub role: String,
    pub status: String,
    pub address: String,
    pub description: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub photo_urls: Vec<String>,
    pub photo_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct PhotoRow {
    pub id: String,
    pub report_id: String,
    pub url: String,
    pub storage_path: String,
    pub sha256: String,
    pub uploader_id: String,
    pub uploaded_at: String,
}

#[derive(Debug, Clone)]
pub struct FeedbackRow {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub message: String,
    pub created_at: String,
}
