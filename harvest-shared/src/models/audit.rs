use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who did what and when. Entries are appended and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// `None` for system-initiated actions.
    pub actor: Option<String>,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor: Option<String>, description: impl Into<String>, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            description: description.into(),
            recorded_at,
        }
    }
}
