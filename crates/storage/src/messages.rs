use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::{
    domain::{AttachmentId, AttachmentKind, ConversationId, MessageBody, MessageId, UserId},
    protocol::{AttachmentInput, AttachmentPayload, MessagePayload},
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};
use tracing::debug;

use crate::{Storage, StorageError};

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct AppendedMessage {
    pub message_id: MessageId,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<AttachmentPayload>,
}

impl Storage {
    /// Inserts a message and all of its attachments in one transaction.
    ///
    /// Membership of `sender_id` is the caller's responsibility. If any
    /// attachment row is rejected the message row is rolled back with it.
    pub async fn append_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        body: &MessageBody,
        attachments: &[AttachmentInput],
    ) -> Result<AppendedMessage, StorageError> {
        let mut uow = self.unit_of_work().await?;

        let rec = sqlx::query(
            "INSERT INTO messages (conversation_id, sender_id, body, kind)
             VALUES (?, ?, ?, 'text')
             RETURNING id, created_at",
        )
        .bind(conversation_id.0)
        .bind(sender_id.0)
        .bind(body.as_str())
        .fetch_one(uow.conn())
        .await?;
        let message_id = MessageId(rec.get::<i64, _>(0));
        let created_at = rec.get::<DateTime<Utc>, _>(1);

        let mut stored = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let rec = sqlx::query(
                "INSERT INTO attachments
                    (message_id, type, storage_provider, storage_key, url, file_name, mime_type,
                     byte_size, width, height, duration_sec, checksum)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 RETURNING id",
            )
            .bind(message_id.0)
            .bind(attachment.kind.as_str())
            .bind(&attachment.storage_provider)
            .bind(&attachment.storage_key)
            .bind(attachment.url.as_deref())
            .bind(attachment.file_name.as_deref())
            .bind(attachment.mime_type.as_deref())
            .bind(attachment.byte_size)
            .bind(attachment.width)
            .bind(attachment.height)
            .bind(attachment.duration_sec)
            .bind(attachment.checksum.as_deref())
            .fetch_one(uow.conn())
            .await?;

            stored.push(AttachmentPayload {
                id: AttachmentId(rec.get::<i64, _>(0)),
                kind: attachment.kind,
                url: attachment.url.clone(),
                file_name: attachment.file_name.clone(),
                mime_type: attachment.mime_type.clone(),
                byte_size: attachment.byte_size,
                width: attachment.width,
                height: attachment.height,
                duration_sec: attachment.duration_sec,
            });
        }

        uow.commit().await?;
        debug!(
            %conversation_id,
            %message_id,
            attachments = stored.len(),
            "stored message"
        );
        Ok(AppendedMessage {
            message_id,
            created_at,
            attachments: stored,
        })
    }

    /// Seek pagination over a conversation's visible history.
    ///
    /// Returns at most `limit` (clamped to `1..=MAX_PAGE_SIZE`) messages with
    /// `id < before`, oldest first. Soft-deleted messages are skipped.
    pub async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<MessagePayload>, StorageError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let mut rows = if let Some(before_id) = before {
            sqlx::query(
                "SELECT m.id, m.conversation_id, m.sender_id, a.username, m.body, m.kind, m.created_at, m.edited_at
                 FROM messages m
                 LEFT JOIN accounts a ON a.id = m.sender_id
                 WHERE m.conversation_id = ? AND m.deleted_at IS NULL AND m.id < ?
                 ORDER BY m.id DESC
                 LIMIT ?",
            )
            .bind(conversation_id.0)
            .bind(before_id.0)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT m.id, m.conversation_id, m.sender_id, a.username, m.body, m.kind, m.created_at, m.edited_at
                 FROM messages m
                 LEFT JOIN accounts a ON a.id = m.sender_id
                 WHERE m.conversation_id = ? AND m.deleted_at IS NULL
                 ORDER BY m.id DESC
                 LIMIT ?",
            )
            .bind(conversation_id.0)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.reverse();
        let ids: Vec<i64> = rows.iter().map(|r| r.get::<i64, _>(0)).collect();
        let mut attachments = self.attachments_for_messages(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let message_id = MessageId(r.get::<i64, _>(0));
                MessagePayload {
                    id: message_id,
                    conversation_id: ConversationId(r.get::<i64, _>(1)),
                    sender_id: UserId(r.get::<i64, _>(2)),
                    sender_username: r.get::<Option<String>, _>(3),
                    body: r.get::<String, _>(4),
                    kind: r.get::<String, _>(5),
                    created_at: r.get::<DateTime<Utc>, _>(6),
                    edited_at: r.get::<Option<DateTime<Utc>>, _>(7),
                    attachments: attachments.remove(&message_id).unwrap_or_default(),
                }
            })
            .collect())
    }

    /// Attachments grouped per message, each list in insertion order.
    async fn attachments_for_messages(
        &self,
        message_ids: &[i64],
    ) -> Result<HashMap<MessageId, Vec<AttachmentPayload>>, StorageError> {
        let mut grouped: HashMap<MessageId, Vec<AttachmentPayload>> = HashMap::new();
        if message_ids.is_empty() {
            return Ok(grouped);
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, message_id, type, url, file_name, mime_type, byte_size, width, height, duration_sec
             FROM attachments
             WHERE message_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in message_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        for row in rows {
            let message_id = MessageId(row.get::<i64, _>(1));
            grouped
                .entry(message_id)
                .or_default()
                .push(attachment_from_row(&row));
        }
        Ok(grouped)
    }

    /// Hides a message from history. Returns false if it was already hidden or unknown.
    pub async fn soft_delete_message(&self, message_id: MessageId) -> Result<bool, StorageError> {
        let updated = sqlx::query(
            "UPDATE messages SET deleted_at = CURRENT_TIMESTAMP WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(message_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    pub async fn count_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<i64, StorageError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
                .bind(conversation_id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn attachment_from_row(row: &SqliteRow) -> AttachmentPayload {
    AttachmentPayload {
        id: AttachmentId(row.get::<i64, _>(0)),
        kind: AttachmentKind::from_db(&row.get::<String, _>(2)),
        url: row.get::<Option<String>, _>(3),
        file_name: row.get::<Option<String>, _>(4),
        mime_type: row.get::<Option<String>, _>(5),
        byte_size: row.get::<Option<i64>, _>(6),
        width: row.get::<Option<i64>, _>(7),
        height: row.get::<Option<i64>, _>(8),
        duration_sec: row.get::<Option<f64>, _>(9),
    }
}

#[cfg(test)]
#[path = "tests/messages_tests.rs"]
mod tests;
