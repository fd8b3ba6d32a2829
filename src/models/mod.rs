pub mod conversation;
pub mod message;
pub mod notification;
pub mod user;

pub use conversation::{ConversationStatus, ConversationSummary, CounterpartSummary, ParticipantPair};
pub use message::MessageView;
pub use notification::NotificationRecord;
pub use user::{PublicProfile, User, UserRole};

use serde::{Deserialize, Serialize};

/// Page metadata returned alongside every paginated result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 {
            (total + limit - 1) / limit
        } else {
            0
        };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}
