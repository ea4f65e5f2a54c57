use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub blob_dir: PathBuf,
    pub public_url: String,
    pub jwt_secret: String,
    pub chat_endpoint: Option<String>,
    pub chat_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_maps_api_key: Option<String>,
    pub fcm_project_id: Option<String>,
    pub fcm_access_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Unset and empty are the same thing
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("SYNTRA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("SYNTRA_JWT_SECRET is unset or still a placeholder. Set it in your .env file and restart.");
        }

        let host = var("SYNTRA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("SYNTRA_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("SYNTRA_PORT must be a port number")?;
        let public_url = var("SYNTRA_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(Self {
            host,
            port,
            db_path: var("SYNTRA_DB_PATH").unwrap_or_else(|| "syntra.db".into()).into(),
            blob_dir: var("SYNTRA_BLOB_DIR").unwrap_or_else(|| "./blobs".into()).into(),
            public_url,
            jwt_secret,
            chat_endpoint: var("SYNTRA_CHAT_ENDPOINT"),
            chat_model: var("SYNTRA_CHAT_MODEL"),
            openai_api_key: var("OPENAI_API_KEY"),
            google_maps_api_key: var("GOOGLE_MAPS_API_KEY"),
            fcm_project_id: var("FCM_PROJECT_ID"),
            fcm_access_token: var("FCM_ACCESS_TOKEN"),
        })
    }
}
