use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message as seen by one requester, with that requester's receipt status
/// joined in ("sent" when no receipt row exists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub file_url: Option<String>,
    pub receipt_status: String,
    pub created_at: DateTime<Utc>,
}
