use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FeedbackComment, NotificationRecord, Report, ReportStatus};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A report was submitted
    ReportCreated { report: Report },

    /// An agent changed a report's status
    ReportStatusChanged {
        id: Uuid,
        status: ReportStatus,
        updated_at: DateTime<Utc>,
    },

    /// An agent deleted a report
    ReportDeleted { id: Uuid },

    /// A feedback comment was posted
    FeedbackCreated { comment: FeedbackComment },

    /// A feedback comment was removed by its author
    FeedbackDeleted { id: Uuid },

    /// Targeted: a notification landed in this user's inbox
    Notification { record: NotificationRecord },
}
