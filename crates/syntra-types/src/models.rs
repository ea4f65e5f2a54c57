use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Roles --

/// Who is acting: a citizen reporting faults or a traffic agent handling them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "usuario")]
    Citizen,
    #[serde(alias = "agente", alias = "transito")]
    Agent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Citizen => "citizen",
            Self::Agent => "agent",
        }
    }

    /// Parse a stored role. Accepts the legacy Spanish names as well.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "citizen" | "usuario" => Some(Self::Citizen),
            "agent" | "agente" | "transito" => Some(Self::Agent),
            _ => None,
        }
    }

    /// Segment used inside client navigation destinations.
    pub fn route_segment(self) -> &'static str {
        match self {
            Self::Citizen => "usuario",
            Self::Agent => "agente",
        }
    }

    pub fn is_agent(self) -> bool {
        matches!(self, Self::Agent)
    }
}

// -- Reports --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    #[serde(rename = "operativo")]
    Operational,
    #[serde(rename = "inspeccion")]
    UnderInspection,
    #[serde(rename = "falla_critica")]
    CriticalFailure,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 3] = [
        Self::Operational,
        Self::UnderInspection,
        Self::CriticalFailure,
    ];

    /// Value persisted in the `reports.status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operational => "operativo",
            Self::UnderInspection => "inspeccion",
            Self::CriticalFailure => "falla_critica",
        }
    }

    /// Read a stored value. Anything unrecognised reads as operational.
    pub fn from_stored(value: &str) -> Self {
        match value {
            "inspeccion" => Self::UnderInspection,
            "falla_critica" => Self::CriticalFailure,
            _ => Self::Operational,
        }
    }

    /// Map a label chosen in the client to a status.
    ///
    /// Stored values are accepted too. Any other label falls through to
    /// critical failure, matching the status picker's last option.
    pub fn from_ui_label(label: &str) -> Self {
        match label.trim() {
            "Operativo" | "operativo" => Self::Operational,
            "Inspección" | "inspeccion" => Self::UnderInspection,
            _ => Self::CriticalFailure,
        }
    }

    pub fn ui_label(self) -> &'static str {
        match self {
            Self::Operational => "Operativo",
            Self::UnderInspection => "Inspección",
            Self::CriticalFailure => "Falla crítico",
        }
    }

    /// Inspection and critical failures are the issues shown on the map.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Operational)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub role: Role,
    pub status: ReportStatus,
    pub status_label: String,
    pub address: String,
    pub description: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub photo_urls: Vec<String>,
    pub photo_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One uploaded photo of a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPhoto {
    pub id: Uuid,
    pub report_id: Uuid,
    pub url: String,
    pub sha256: String,
    pub uploader_id: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub total: u32,
    pub fixed: u32,
    pub inspection: u32,
    pub urgent: u32,
    pub solved_semester: u32,
    pub active: u32,
    pub fixed_percent: u32,
}

impl ReportStats {
    pub fn new(fixed: u32, inspection: u32, urgent: u32, solved_semester: u32) -> Self {
        let total = fixed + inspection + urgent;
        let fixed_percent = if total > 0 { fixed * 100 / total } else { 0 };
        Self {
            total,
            fixed,
            inspection,
            urgent,
            solved_semester,
            active: inspection + urgent,
            fixed_percent,
        }
    }
}

// -- Feedback --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackComment {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// -- Chat --

/// A button the client renders under a bot reply. `destination` is an
/// opaque client route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAction {
    pub label: String,
    pub destination: String,
}

impl ChatAction {
    pub fn new(label: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            destination: destination.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub is_user: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ChatAction>,
}

impl ChatMessage {
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
            actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<ChatAction>) -> Self {
        self.actions = actions;
        self
    }
}

// -- Notifications --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub title: String,
    pub body: String,
    /// Formatted as `dd/MM/yyyy HH:mm:ss`.
    pub timestamp: String,
}

// -- Accounts --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_labels_round_trip() {
        for status in ReportStatus::ALL {
            assert_eq!(ReportStatus::from_ui_label(status.ui_label()), status);
        }
    }

    #[test]
    fn labels_map_to_distinct_stored_values() {
        let stored: Vec<&str> = ["Operativo", "Inspección", "Falla crítico"]
            .iter()
            .map(|l| ReportStatus::from_ui_label(l).as_str())
            .collect();
        assert_eq!(stored, vec!["operativo", "inspeccion", "falla_critica"]);
    }

    #[test]
    fn unknown_label_is_critical() {
        assert_eq!(
            ReportStatus::from_ui_label("Falla crítica"),
            ReportStatus::CriticalFailure
        );
        assert_eq!(ReportStatus::from_ui_label(""), ReportStatus::CriticalFailure);
    }

    #[test]
    fn unknown_stored_value_reads_operational() {
        assert_eq!(ReportStatus::from_stored("???"), ReportStatus::Operational);
    }

    #[test]
    fn role_accepts_legacy_names() {
        let role: Role = serde_json::from_str("\"usuario\"").unwrap();
        assert_eq!(role, Role::Citizen);
        let role: Role = serde_json::from_str("\"transito\"").unwrap();
        assert_eq!(role, Role::Agent);
        assert_eq!(serde_json::to_string(&Role::Agent).unwrap(), "\"agent\"");
    }

    #[test]
    fn stats_derive_active_and_percent() {
        let stats = ReportStats::new(3, 2, 1, 2);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.active, 3);
        assert_eq!(stats.fixed_percent, 50);
        assert_eq!(ReportStats::new(0, 0, 0, 0).fixed_percent, 0);
    }
}
