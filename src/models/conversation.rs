use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
    Blocked,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
            ConversationStatus::Blocked => "blocked",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "archived" => ConversationStatus::Archived,
            "blocked" => ConversationStatus::Blocked,
            _ => ConversationStatus::Active,
        }
    }
}

/// An unordered pair of participants.
///
/// Conversations store an ordered (initiator, receiver) tuple, but identity is
/// symmetric: this type is the single place where the symmetry lives, so call
/// sites never hand-roll OR-of-both-orderings reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    first: Uuid,
    second: Uuid,
}

impl ParticipantPair {
    /// Rejects a self-pair; a user cannot converse with themselves.
    pub fn new(a: Uuid, b: Uuid) -> Result<Self, AppError> {
        if a == b {
            return Err(AppError::BadRequest(
                "cannot start a conversation with yourself".into(),
            ));
        }
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Ok(Self { first, second })
    }

    pub fn first(&self) -> Uuid {
        self.first
    }

    pub fn second(&self) -> Uuid {
        self.second
    }

    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.first {
            Some(self.second)
        } else if user_id == self.second {
            Some(self.first)
        } else {
            None
        }
    }
}

/// The participant who is not the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartSummary {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
}

/// Normalized projection of a conversation relative to one viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub counterpart: CounterpartSummary,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Preview of the most recent message, used by the conversation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessagePreview {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationListItem {
    #[serde(flatten)]
    pub summary: ConversationSummary,
    pub last_message: Option<LastMessagePreview>,
    pub unread_count: i64,
}
