use std::sync::Arc;

use serde_json::Value;
use sqlx::{Pool, Postgres, Row};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::NotificationRecord;
use crate::websocket::PushDelivery;

/// Persist-then-push notification fan-out.
///
/// Every notification is written to the store first so it survives the
/// recipient being offline; the realtime push afterwards is best effort.
/// The service only knows how to hand a frame to some [`PushDelivery`], it
/// never touches sockets itself.
pub struct NotificationService {
    db: Pool<Postgres>,
    push: Arc<dyn PushDelivery>,
}

impl NotificationService {
    pub fn new(db: Pool<Postgres>, push: Arc<dyn PushDelivery>) -> Self {
        Self { db, push }
    }

    /// Notify one user. Returns the persisted notification id.
    pub async fn notify_single_user(
        &self,
        user_id: Uuid,
        event: &str,
        payload: &Value,
    ) -> AppResult<Uuid> {
        let notification_id = self.persist(&[user_id], event, payload).await?;
        let enriched = with_notification_id(payload, notification_id);
        self.push.deliver_to_user(user_id, event, &enriched);
        Ok(notification_id)
    }

    /// Notify a set of users independently. A failure for one recipient is
    /// logged and never aborts delivery to the rest.
    pub async fn notify_multiple_users(&self, user_ids: &[Uuid], event: &str, payload: &Value) {
        for &user_id in user_ids {
            if let Err(err) = self.notify_single_user(user_id, event, payload).await {
                warn!(%user_id, event, error = %err, "failed to notify user");
            }
        }
    }

    /// Broadcast to every currently connected user.
    ///
    /// Scoped to live connections only: with nobody connected there is
    /// nothing to persist and the call is a no-op.
    pub async fn notify_all_users(&self, event: &str, payload: &Value) -> AppResult<Option<Uuid>> {
        let recipients = self.push.connected_user_ids();
        if recipients.is_empty() {
            warn!(event, "broadcast skipped, no connected users");
            return Ok(None);
        }

        let notification_id = self.persist(&recipients, event, payload).await?;
        let enriched = with_notification_id(payload, notification_id);
        for user_id in recipients {
            self.push.deliver_to_user(user_id, event, &enriched);
        }
        Ok(Some(notification_id))
    }

    /// Notify every elevated-role user, connected or not.
    ///
    /// The admin roster is read fresh on every call so role changes take
    /// effect immediately.
    pub async fn emit_to_admins(&self, event: &str, payload: &Value) -> AppResult<Option<Uuid>> {
        let admins: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM users WHERE role IN ('admin', 'super_admin')",
        )
        .fetch_all(&self.db)
        .await?;
        if admins.is_empty() {
            warn!(event, "admin notification skipped, no admin users");
            return Ok(None);
        }

        let notification_id = self.persist(&admins, event, payload).await?;
        let enriched = with_notification_id(payload, notification_id);
        for user_id in admins {
            self.push.deliver_to_user(user_id, event, &enriched);
        }
        Ok(Some(notification_id))
    }

    /// Read back one stored notification with its recipient set.
    pub async fn get_notification(&self, id: Uuid) -> AppResult<Option<NotificationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, notification_type, title, message, metadata, created_at
            FROM notifications WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let recipients = sqlx::query_scalar(
            "SELECT user_id FROM notification_recipients WHERE notification_id = $1",
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        Ok(Some(NotificationRecord {
            id: row.get("id"),
            notification_type: row.get("notification_type"),
            title: row.get("title"),
            message: row.get("message"),
            metadata: row.get("metadata"),
            recipients,
            created_at: row.get("created_at"),
        }))
    }

    /// One notification row plus a recipient row per user, atomically.
    async fn persist(&self, recipients: &[Uuid], event: &str, payload: &Value) -> AppResult<Uuid> {
        let (title, message) = build_content(event, payload);

        let mut tx = self.db.begin().await?;
        let notification_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (notification_type, title, message, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(event)
        .bind(&title)
        .bind(&message)
        .bind(payload)
        .fetch_one(&mut *tx)
        .await?;

        for &user_id in recipients {
            sqlx::query(
                r#"
                INSERT INTO notification_recipients (notification_id, user_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(notification_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(notification_id)
    }
}

/// Human-readable title and body for a stored notification, derived from the
/// event type with payload fields overriding the defaults.
pub fn build_content(event: &str, payload: &Value) -> (String, String) {
    let title = payload
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| default_title(event).to_owned());
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default();
    (title, message)
}

fn default_title(event: &str) -> &str {
    match event {
        "conversation_update" => "Conversation updated",
        "system_announcement" => "Announcement",
        _ => "Notification",
    }
}

fn with_notification_id(payload: &Value, notification_id: Uuid) -> Value {
    let mut enriched = payload.clone();
    if let Value::Object(map) = &mut enriched {
        map.insert(
            "notification_id".to_owned(),
            Value::String(notification_id.to_string()),
        );
    }
    enriched
}
