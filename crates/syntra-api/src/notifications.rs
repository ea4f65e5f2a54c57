use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use syntra_gateway::Dispatcher;
use syntra_types::api::Claims;
use syntra_types::events::GatewayEvent;
use syntra_types::models::{NotificationRecord, Report};

use crate::auth::AppState;
use crate::error::ApiResult;
use crate::push::{PushMessage, PushSender};

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Per-user list of received notifications, kept for the process lifetime.
pub trait NotificationInbox: Send + Sync {
    fn record(&self, user_id: Uuid, record: NotificationRecord);
    fn list(&self, user_id: Uuid) -> Vec<NotificationRecord>;
    fn clear(&self, user_id: Uuid);
}

#[derive(Default)]
pub struct MemoryInbox {
    inboxes: Mutex<HashMap<Uuid, Vec<NotificationRecord>>>,
}

impl MemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationInbox for MemoryInbox {
    fn record(&self, user_id: Uuid, record: NotificationRecord) {
        match self.inboxes.lock() {
            Ok(mut inboxes) => inboxes.entry(user_id).or_default().push(record),
            Err(_) => warn!("Inbox lock poisoned, dropping notification for {}", user_id),
        }
    }

    fn list(&self, user_id: Uuid) -> Vec<NotificationRecord> {
        self.inboxes
            .lock()
            .map(|i| i.get(&user_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn clear(&self, user_id: Uuid) {
        if let Ok(mut inboxes) = self.inboxes.lock() {
            inboxes.remove(&user_id);
        }
    }
}

/// Records notifications in the inbox, pushes them to the user's live
/// gateway connection and, when possible, to their device.
pub struct Notifier {
    inbox: Arc<dyn NotificationInbox>,
    push: Option<Arc<dyn PushSender>>,
    dispatcher: Dispatcher,
}

impl Notifier {
    pub fn new(
        inbox: Arc<dyn NotificationInbox>,
        push: Option<Arc<dyn PushSender>>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            inbox,
            push,
            dispatcher,
        }
    }

    pub fn inbox(&self) -> &dyn NotificationInbox {
        self.inbox.as_ref()
    }

    /// Delivery failures are logged and dropped.
    pub async fn notify(
        &self,
        user_id: Uuid,
        device_token: Option<&str>,
        title: &str,
        body: &str,
        data: BTreeMap<String, String>,
    ) {
        let record = NotificationRecord {
            title: title.to_string(),
            body: body.to_string(),
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        };
        self.inbox.record(user_id, record.clone());
        self.dispatcher
            .send_to_user(user_id, GatewayEvent::Notification { record })
            .await;

        let (Some(push), Some(token)) = (&self.push, device_token) else {
            debug!("No push delivery for {}", user_id);
            return;
        };
        let message = PushMessage {
            token: token.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            data,
        };
        if let Err(e) = push.send(&message).await {
            warn!("Push to {} failed: {:#}", user_id, e);
        }
    }

    pub async fn report_created(&self, user_id: Uuid, device_token: Option<&str>, report: &Report) {
        let data = BTreeMap::from([("reportId".to_string(), report.id.to_string())]);
        self.notify(
            user_id,
            device_token,
            "Nuevo reporte",
            "Tu reporte se ha registrado exitosamente.",
            data,
        )
        .await;
    }

    pub async fn status_changed(&self, user_id: Uuid, device_token: Option<&str>, report: &Report) {
        let body = format!(
            "Tu reporte en {} ahora está: {}.",
            report.address, report.status_label
        );
        let data = BTreeMap::from([
            ("reportId".to_string(), report.id.to_string()),
            ("status".to_string(), report.status.as_str().to_string()),
        ]);
        self.notify(user_id, device_token, "Estado de reporte actualizado", &body, data)
            .await;
    }

    pub async fn test_send(&self, user_id: Uuid, device_token: Option<&str>) {
        let data = BTreeMap::from([(
            "extraInfo".to_string(),
            "Mensaje interno de prueba".to_string(),
        )]);
        self.notify(
            user_id,
            device_token,
            "Syntra Notificación",
            "Prueba exitosa desde tu app 🚦",
            data,
        )
        .await;
    }
}

// -- Handlers --

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Json<Vec<NotificationRecord>> {
    Json(state.notifier.inbox().list(claims.sub))
}

/// DELETE /notifications
pub async fn clear_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> StatusCode {
    state.notifier.inbox().clear(claims.sub);
    StatusCode::NO_CONTENT
}

/// POST /notifications/test
pub async fn send_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let token = state.device_token(claims.sub).await?;
    state.notifier.test_send(claims.sub, token.as_deref()).await;
    Ok(StatusCode::ACCEPTED)
}
