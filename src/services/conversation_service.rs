use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::conversation::{
    ConversationListItem, ConversationStatus, ConversationSummary, CounterpartSummary,
    LastMessagePreview, ParticipantPair,
};
use crate::models::{MessageView, Pagination};
use crate::websocket::events::event;
use crate::websocket::PushMessage;

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationListItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetailResponse {
    pub conversation: ConversationSummary,
    pub messages: Vec<MessageView>,
    pub pagination: Pagination,
}

/// Conversation lifecycle and queries.
///
/// Authorization is the participant filter itself: every operation loads the
/// row through a membership-filtered query and a miss is always the same
/// generic failure. Operations with realtime side effects return the direct
/// result together with the pushes for the transport layer to execute.
pub struct ConversationService;

impl ConversationService {
    /// Page through the caller's conversations, most recently updated first,
    /// optionally narrowed by a case-insensitive substring over either
    /// participant's display name or the last message content.
    pub async fn list_conversations(
        db: &Pool<Postgres>,
        user_id: Uuid,
        page: Option<i64>,
        limit: Option<i64>,
        search: Option<String>,
    ) -> AppResult<(ConversationListResponse, Vec<PushMessage>)> {
        let (page, limit, offset) = sanitize_paging(page, limit);
        let search = search.filter(|s| !s.trim().is_empty());

        let rows_fut = sqlx::query(
            r#"
            SELECT c.id, c.status, c.created_at, c.updated_at,
                   c.initiator_id, c.receiver_id,
                   iu.display_name AS initiator_name, iu.email AS initiator_email,
                   ru.display_name AS receiver_name, ru.email AS receiver_email,
                   lm.id AS last_message_id, lm.sender_id AS last_message_sender_id,
                   lm.content AS last_message_content, lm.created_at AS last_message_at,
                   (
                     SELECT COUNT(*) FROM messages m
                       LEFT JOIN message_receipts r
                         ON r.message_id = m.id AND r.user_id = $1
                      WHERE m.conversation_id = c.id
                        AND m.sender_id <> $1
                        AND COALESCE(r.status, 'sent') <> 'read'
                   ) AS unread_count
            FROM conversations c
            JOIN users iu ON iu.id = c.initiator_id
            JOIN users ru ON ru.id = c.receiver_id
            LEFT JOIN messages lm ON lm.id = c.last_message_id
            WHERE (c.initiator_id = $1 OR c.receiver_id = $1)
              AND ($2::text IS NULL
                   OR iu.display_name ILIKE '%' || $2 || '%'
                   OR ru.display_name ILIKE '%' || $2 || '%'
                   OR lm.content ILIKE '%' || $2 || '%')
            ORDER BY c.updated_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(search.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(db);

        let count_fut = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM conversations c
            JOIN users iu ON iu.id = c.initiator_id
            JOIN users ru ON ru.id = c.receiver_id
            LEFT JOIN messages lm ON lm.id = c.last_message_id
            WHERE (c.initiator_id = $1 OR c.receiver_id = $1)
              AND ($2::text IS NULL
                   OR iu.display_name ILIKE '%' || $2 || '%'
                   OR ru.display_name ILIKE '%' || $2 || '%'
                   OR lm.content ILIKE '%' || $2 || '%')
            "#,
        )
        .bind(user_id)
        .bind(search.as_deref())
        .fetch_one(db);

        // Page rows and total are independent reads; issue them concurrently.
        let (rows, total) = tokio::try_join!(rows_fut, count_fut)?;

        let conversations = rows
            .into_iter()
            .map(|row| map_list_item(&row, user_id))
            .collect::<AppResult<Vec<_>>>()?;

        let response = ConversationListResponse {
            conversations,
            pagination: Pagination::new(page, limit, total),
        };

        let pushes = vec![PushMessage::new(
            user_id,
            event::CONVERSATION_LIST_RESPONSE,
            serde_json::to_value(&response)?,
        )];
        Ok((response, pushes))
    }

    /// Load one conversation with a page of its messages.
    ///
    /// Pages are cut from the most recent end of the history, then reversed in
    /// memory so each page reads chronologically.
    pub async fn load_conversation(
        db: &Pool<Postgres>,
        user_id: Uuid,
        conversation_id: Uuid,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> AppResult<(ConversationDetailResponse, Vec<PushMessage>)> {
        let conversation = Self::load_summary(db, conversation_id, user_id).await?;
        let (page, limit, offset) = sanitize_paging(page, limit);

        let rows_fut = sqlx::query(
            r#"
            SELECT m.id, m.sender_id, m.content, m.file_url, m.created_at,
                   COALESCE(r.status, 'sent') AS receipt_status
            FROM messages m
            LEFT JOIN message_receipts r
              ON r.message_id = m.id AND r.user_id = $2
            WHERE m.conversation_id = $1
            ORDER BY m.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db);

        let count_fut =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
                .bind(conversation_id)
                .fetch_one(db);

        let (rows, total) = tokio::try_join!(rows_fut, count_fut)?;

        let mut messages = rows
            .into_iter()
            .map(|row| map_message(&row))
            .collect::<AppResult<Vec<_>>>()?;
        // Newest-first from the store, oldest-first for the client.
        messages.reverse();

        let response = ConversationDetailResponse {
            conversation,
            messages,
            pagination: Pagination::new(page, limit, total),
        };

        let pushes = vec![PushMessage::new(
            user_id,
            event::CONVERSATION_RESPONSE,
            serde_json::to_value(&response)?,
        )];
        Ok((response, pushes))
    }

    /// Open (or return the existing) conversation between two users.
    ///
    /// Idempotent in either argument order; a self-conversation never reaches
    /// the store.
    pub async fn initiate_conversation(
        db: &Pool<Postgres>,
        initiator_id: Uuid,
        target_user_id: Uuid,
    ) -> AppResult<(ConversationSummary, Vec<PushMessage>)> {
        let pair = ParticipantPair::new(initiator_id, target_user_id)?;

        let conversation_id = match Self::find_by_pair(db, &pair).await? {
            Some(existing) => existing,
            None => {
                let target_exists: Option<Uuid> =
                    sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
                        .bind(target_user_id)
                        .fetch_optional(db)
                        .await?;
                if target_exists.is_none() {
                    return Err(AppError::NotFound("User not found".into()));
                }
                sqlx::query_scalar(
                    "INSERT INTO conversations (initiator_id, receiver_id) VALUES ($1, $2) RETURNING id",
                )
                .bind(initiator_id)
                .bind(target_user_id)
                .fetch_one(db)
                .await?
            }
        };

        let caller_view = Self::load_summary(db, conversation_id, initiator_id).await?;
        let target_view = Self::load_summary(db, conversation_id, target_user_id).await?;

        let pushes = vec![
            PushMessage::new(
                initiator_id,
                event::CONVERSATION_UPDATE,
                serde_json::to_value(&caller_view)?,
            ),
            // Best-effort: a target with no live connections drops this.
            PushMessage::new(
                target_user_id,
                event::CONVERSATION_UPDATE,
                serde_json::to_value(&target_view)?,
            ),
        ];
        Ok((caller_view, pushes))
    }

    pub async fn archive_conversation(
        db: &Pool<Postgres>,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<(ConversationSummary, Vec<PushMessage>)> {
        let summary =
            Self::update_conversation_status(db, user_id, conversation_id, ConversationStatus::Archived)
                .await?;
        let pushes = status_change_pushes(user_id, &summary, None)?;
        Ok((summary, pushes))
    }

    pub async fn block_conversation(
        db: &Pool<Postgres>,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<(ConversationSummary, Vec<PushMessage>)> {
        let summary =
            Self::update_conversation_status(db, user_id, conversation_id, ConversationStatus::Blocked)
                .await?;
        let pushes = status_change_pushes(user_id, &summary, Some("blocked"))?;
        Ok((summary, pushes))
    }

    pub async fn unblock_conversation(
        db: &Pool<Postgres>,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<(ConversationSummary, Vec<PushMessage>)> {
        let summary =
            Self::update_conversation_status(db, user_id, conversation_id, ConversationStatus::Active)
                .await?;
        let pushes = status_change_pushes(user_id, &summary, Some("unblocked"))?;
        Ok((summary, pushes))
    }

    /// Remove the conversation entirely. Both sides are told what happened.
    pub async fn delete_conversation(
        db: &Pool<Postgres>,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<(ConversationSummary, Vec<PushMessage>)> {
        let summary = Self::load_summary(db, conversation_id, user_id).await?;

        sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .execute(db)
            .await?;

        let payload = serde_json::json!({
            "conversation_id": conversation_id,
            "action": "deleted",
        });
        let pushes = vec![
            PushMessage::new(user_id, event::CONVERSATION_UPDATE, payload.clone()),
            PushMessage::new(summary.counterpart.id, event::CONVERSATION_UPDATE, payload),
        ];
        Ok((summary, pushes))
    }

    /// Shared authorize-mutate-project primitive behind archive/block/unblock.
    ///
    /// Any status may transition to any other; re-applying the current status
    /// succeeds as a no-op.
    pub async fn update_conversation_status(
        db: &Pool<Postgres>,
        user_id: Uuid,
        conversation_id: Uuid,
        status: ConversationStatus,
    ) -> AppResult<ConversationSummary> {
        let updated = sqlx::query(
            r#"
            UPDATE conversations SET status = $3, updated_at = NOW()
            WHERE id = $1 AND (initiator_id = $2 OR receiver_id = $2)
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(status.as_str())
        .execute(db)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::conversation_not_found());
        }
        Self::load_summary(db, conversation_id, user_id).await
    }

    /// Membership-filtered load and projection relative to one viewer.
    ///
    /// A missing row and a row the viewer is not party to are the same
    /// failure by construction.
    pub async fn load_summary(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> AppResult<ConversationSummary> {
        let row = sqlx::query(
            r#"
            SELECT c.id, c.status, c.created_at, c.updated_at,
                   c.initiator_id, c.receiver_id,
                   iu.display_name AS initiator_name, iu.email AS initiator_email,
                   ru.display_name AS receiver_name, ru.email AS receiver_email
            FROM conversations c
            JOIN users iu ON iu.id = c.initiator_id
            JOIN users ru ON ru.id = c.receiver_id
            WHERE c.id = $1 AND (c.initiator_id = $2 OR c.receiver_id = $2)
            "#,
        )
        .bind(conversation_id)
        .bind(viewer_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(AppError::conversation_not_found)?;

        map_summary(&row, viewer_id)
    }

    /// The one home of the symmetric pair lookup: a conversation matches in
    /// either stored orientation.
    async fn find_by_pair(db: &Pool<Postgres>, pair: &ParticipantPair) -> AppResult<Option<Uuid>> {
        let id = sqlx::query_scalar(
            r#"
            SELECT id FROM conversations
            WHERE (initiator_id = $1 AND receiver_id = $2)
               OR (initiator_id = $2 AND receiver_id = $1)
            LIMIT 1
            "#,
        )
        .bind(pair.first())
        .bind(pair.second())
        .fetch_optional(db)
        .await?;
        Ok(id)
    }
}

fn sanitize_paging(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(DEFAULT_PAGE).max(1);
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    (page, limit, (page - 1) * limit)
}

fn map_summary(row: &PgRow, viewer_id: Uuid) -> AppResult<ConversationSummary> {
    let initiator_id: Uuid = row.get("initiator_id");
    let receiver_id: Uuid = row.get("receiver_id");
    let status: String = row.get("status");

    let counterpart = if initiator_id == viewer_id {
        CounterpartSummary {
            id: receiver_id,
            display_name: row.get("receiver_name"),
            email: row.get("receiver_email"),
        }
    } else {
        CounterpartSummary {
            id: initiator_id,
            display_name: row.get("initiator_name"),
            email: row.get("initiator_email"),
        }
    };

    Ok(ConversationSummary {
        id: row.get("id"),
        counterpart,
        status: ConversationStatus::from_str(&status),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn map_list_item(row: &PgRow, viewer_id: Uuid) -> AppResult<ConversationListItem> {
    let summary = map_summary(row, viewer_id)?;

    let last_message = match row.try_get::<Uuid, _>("last_message_id").ok() {
        Some(id) => Some(LastMessagePreview {
            id,
            sender_id: row.get("last_message_sender_id"),
            content: row.get("last_message_content"),
            created_at: row.get("last_message_at"),
        }),
        None => None,
    };

    Ok(ConversationListItem {
        summary,
        last_message,
        unread_count: row.get("unread_count"),
    })
}

fn map_message(row: &PgRow) -> AppResult<MessageView> {
    Ok(MessageView {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        file_url: row.try_get("file_url").ok(),
        receipt_status: row.get("receipt_status"),
        created_at: row.get("created_at"),
    })
}

/// Pushes for a status mutation: the caller always gets the refreshed
/// summary; the counterpart gets an explicit action tag when one exists.
/// Archive deliberately carries no tag, only the summary.
fn status_change_pushes(
    caller_id: Uuid,
    summary: &ConversationSummary,
    action: Option<&str>,
) -> AppResult<Vec<PushMessage>> {
    let summary_value = serde_json::to_value(summary)?;
    let counterpart_payload = match action {
        Some(action) => serde_json::json!({
            "conversation_id": summary.id,
            "action": action,
        }),
        None => summary_value.clone(),
    };

    Ok(vec![
        PushMessage::new(caller_id, event::CONVERSATION_UPDATE, summary_value),
        PushMessage::new(
            summary.counterpart.id,
            event::CONVERSATION_UPDATE,
            counterpart_payload,
        ),
    ])
}
