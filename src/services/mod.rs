pub mod conversation_service;
pub mod notification_service;

pub use conversation_service::ConversationService;
pub use notification_service::NotificationService;
