use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted notification. Immutable once created; the recipient set is
/// recorded atomically with the record itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub recipients: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}
