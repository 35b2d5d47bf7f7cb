use pulsey_core::chrono::Utc;
use pulsey_core::domain::conversation::ConversationId;
use pulsey_core::domain::message::{ContentType, Message, MessageId, MessageSender, NewMessage};
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl super::MessageRepository for SqlMessageRepository {
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let id = MessageId(format!("msg-{}", uuid::Uuid::new_v4()));
        let now = Utc::now();
        let metadata_json = serde_json::to_string(&message.metadata)
            .map_err(|e| RepositoryError::Decode(format!("metadata encode: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, sender, content, content_type, metadata_json,
                is_read, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&id.0)
        .bind(&message.conversation_id.0)
        .bind(message.sender.as_str())
        .bind(&message.content)
        .bind(message.content_type.as_str())
        .bind(&metadata_json)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id,
            conversation_id: message.conversation_id,
            sender: message.sender,
            content: message.content,
            content_type: message.content_type,
            metadata: message.metadata,
            is_read: false,
            created_at: now,
        })
    }

    async fn list_recent(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender, content, content_type, metadata_json,
                   is_read, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(&conversation_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages =
            rows.iter().map(message_from_row).collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn mark_read(&self, message_ids: &[MessageId]) -> Result<(), RepositoryError> {
        for id in message_ids {
            sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ?")
                .bind(&id.0)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message, RepositoryError> {
    let sender: String = row.try_get("sender")?;
    let content_type: String = row.try_get("content_type")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let created_at: String = row.try_get("created_at")?;
    let is_read: i64 = row.try_get("is_read")?;

    Ok(Message {
        id: MessageId(row.try_get("id")?),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        sender: MessageSender::parse(&sender)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid sender: {sender}")))?,
        content: row.try_get("content")?,
        content_type: ContentType::parse(&content_type).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid content_type: {content_type}"))
        })?,
        metadata: serde_json::from_str(&metadata_json)
            .map_err(|e| RepositoryError::Decode(format!("invalid metadata json: {e}")))?,
        is_read: is_read != 0,
        created_at: parse_timestamp("created_at", created_at)?,
    })
}
