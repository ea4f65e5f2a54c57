use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

/// A push notification addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<()>;
}

/// Firebase Cloud Messaging, HTTP v1 API.
pub struct FcmSender {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl FcmSender {
    pub fn new(project_id: &str, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!(
                "https://fcm.googleapis.com/v1/projects/{}/messages:send",
                project_id
            ),
            access_token: access_token.into(),
        }
    }
}

pub(crate) fn fcm_body(message: &PushMessage) -> Value {
    json!({
        "message": {
            "token": message.token,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "data": message.data,
        }
    })
}

#[async_trait]
impl PushSender for FcmSender {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&fcm_body(message))
            .send()
            .await
            .context("FCM request failed")?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("FCM send failed: {} - {}", status, body);
        }
        info!("Push notification delivered: {}", body);
        Ok(())
    }
}
