use shared::domain::{ConversationId, ConversationKind, DmPair, MemberRole, UserId};
use sqlx::Row;
use tracing::{debug, info};

use crate::{Storage, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMember {
    pub user_id: UserId,
    pub username: Option<String>,
    pub role: MemberRole,
}

impl Storage {
    pub async fn find_dm(&self, pair: DmPair) -> Result<Option<ConversationId>, StorageError> {
        let row = sqlx::query(
            "SELECT id FROM conversations
             WHERE kind = 'dm' AND dm_low_user_id = ? AND dm_high_user_id = ?",
        )
        .bind(pair.low().0)
        .bind(pair.high().0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ConversationId(r.get::<i64, _>(0))))
    }

    /// Returns the one direct conversation for `pair`, creating it on first use.
    ///
    /// Concurrent first-time callers race on the `conversations_dm_pair` unique
    /// index. The loser re-reads and returns the winner's id; creation is
    /// attempted at most twice before the error is surfaced.
    pub async fn resolve_or_create_dm(
        &self,
        pair: DmPair,
        created_by: UserId,
    ) -> Result<ConversationId, StorageError> {
        if let Some(conversation_id) = self.find_dm(pair).await? {
            return Ok(conversation_id);
        }

        match self.create_dm(pair, created_by).await {
            Ok(conversation_id) => Ok(conversation_id),
            Err(err) if err.is_unique_violation() => {
                debug!(
                    low = %pair.low(),
                    high = %pair.high(),
                    "direct conversation created concurrently; re-reading"
                );
                match self.find_dm(pair).await? {
                    Some(conversation_id) => Ok(conversation_id),
                    None => self.create_dm(pair, created_by).await,
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn create_dm(
        &self,
        pair: DmPair,
        created_by: UserId,
    ) -> Result<ConversationId, StorageError> {
        let mut uow = self.unit_of_work().await?;

        let rec = sqlx::query(
            "INSERT INTO conversations (kind, created_by, dm_low_user_id, dm_high_user_id)
             VALUES ('dm', ?, ?, ?)
             RETURNING id",
        )
        .bind(created_by.0)
        .bind(pair.low().0)
        .bind(pair.high().0)
        .fetch_one(uow.conn())
        .await?;
        let conversation_id = ConversationId(rec.get::<i64, _>(0));

        sqlx::query(
            "INSERT INTO conversation_members (conversation_id, user_id, role)
             VALUES (?, ?, 'owner'), (?, ?, 'member')",
        )
        .bind(conversation_id.0)
        .bind(pair.low().0)
        .bind(conversation_id.0)
        .bind(pair.high().0)
        .execute(uow.conn())
        .await?;

        uow.commit().await?;
        info!(
            %conversation_id,
            low = %pair.low(),
            high = %pair.high(),
            "created direct conversation"
        );
        Ok(conversation_id)
    }

    /// Creates a shared lobby conversation with `created_by` as its owner.
    pub async fn create_lobby(&self, created_by: UserId) -> Result<ConversationId, StorageError> {
        let mut uow = self.unit_of_work().await?;

        let rec = sqlx::query(
            "INSERT INTO conversations (kind, created_by) VALUES ('lobby', ?) RETURNING id",
        )
        .bind(created_by.0)
        .fetch_one(uow.conn())
        .await?;
        let conversation_id = ConversationId(rec.get::<i64, _>(0));

        sqlx::query(
            "INSERT INTO conversation_members (conversation_id, user_id, role) VALUES (?, ?, 'owner')",
        )
        .bind(conversation_id.0)
        .bind(created_by.0)
        .execute(uow.conn())
        .await?;

        uow.commit().await?;
        info!(%conversation_id, "created lobby conversation");
        Ok(conversation_id)
    }

    pub async fn conversation_kind(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationKind>, StorageError> {
        let row = sqlx::query("SELECT kind FROM conversations WHERE id = ?")
            .bind(conversation_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| match r.get::<String, _>(0).as_str() {
            "lobby" => ConversationKind::Lobby,
            _ => ConversationKind::Dm,
        }))
    }

    pub async fn list_members(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<StoredMember>, StorageError> {
        let rows = sqlx::query(
            "SELECT m.user_id, a.username, m.role
             FROM conversation_members m
             LEFT JOIN accounts a ON a.id = m.user_id
             WHERE m.conversation_id = ?
             ORDER BY m.user_id ASC",
        )
        .bind(conversation_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StoredMember {
                user_id: UserId(r.get::<i64, _>(0)),
                username: r.get::<Option<String>, _>(1),
                role: MemberRole::from_db(&r.get::<String, _>(2)),
            })
            .collect())
    }

    /// The caller's most recently active direct conversation and its other participant.
    ///
    /// Activity is the newest visible message's time, or the creation time for an
    /// empty conversation. Equal times fall back to the newest message id, then
    /// the newest conversation.
    pub async fn last_dm_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<(ConversationId, UserId)>, StorageError> {
        let row = sqlx::query(
            "SELECT
                c.id,
                CASE WHEN c.dm_low_user_id = ?1 THEN c.dm_high_user_id ELSE c.dm_low_user_id END,
                COALESCE(
                    (SELECT MAX(m.created_at) FROM messages m
                     WHERE m.conversation_id = c.id AND m.deleted_at IS NULL),
                    c.created_at
                ) AS last_at,
                (SELECT MAX(m.id) FROM messages m
                 WHERE m.conversation_id = c.id AND m.deleted_at IS NULL) AS last_message_id
             FROM conversations c
             INNER JOIN conversation_members cm ON cm.conversation_id = c.id AND cm.user_id = ?1
             WHERE c.kind = 'dm'
             ORDER BY last_at DESC, last_message_id DESC, c.id DESC
             LIMIT 1",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            (
                ConversationId(r.get::<i64, _>(0)),
                UserId(r.get::<i64, _>(1)),
            )
        }))
    }
}

#[cfg(test)]
#[path = "tests/conversations_tests.rs"]
mod tests;
