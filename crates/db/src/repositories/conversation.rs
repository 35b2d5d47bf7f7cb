use pulsey_core::chrono::Utc;
use pulsey_core::domain::conversation::{
    Conversation, ConversationId, ConversationMetadata, ConversationStatus,
};
use pulsey_core::domain::instance::AgentInstanceId;
use pulsey_core::domain::roster::{EmployeeId, OrgId};
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_json, parse_optional_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl super::ConversationRepository for SqlConversationRepository {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let metadata_json = serde_json::to_string(&conversation.metadata)
            .map_err(|e| RepositoryError::Decode(format!("metadata encode: {e}")))?;

        // The unique (instance_id, participant_id) index makes a concurrent
        // double-create converge on one row.
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO conversations (
                id, org_id, instance_id, participant_id, status, message_count,
                unread_count, last_message_at, metadata_json, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&conversation.id.0)
        .bind(&conversation.org_id.0)
        .bind(&conversation.instance_id.0)
        .bind(&conversation.participant_id.0)
        .bind(conversation.status.as_str())
        .bind(conversation.message_count as i64)
        .bind(conversation.unread_count as i64)
        .bind(conversation.last_message_at.map(|ts| ts.to_rfc3339()))
        .bind(&metadata_json)
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_by_participant(&conversation.instance_id, &conversation.participant_id)
            .await?
            .ok_or_else(|| {
                RepositoryError::Decode(format!(
                    "conversation vanished after insert for instance {}",
                    conversation.instance_id.0
                ))
            })
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, org_id, instance_id, participant_id, status, message_count,
                unread_count, last_message_at, metadata_json, created_at, updated_at
            FROM conversations
            WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| conversation_from_row(&r)).transpose()
    }

    async fn find_by_participant(
        &self,
        instance_id: &AgentInstanceId,
        participant_id: &EmployeeId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, org_id, instance_id, participant_id, status, message_count,
                unread_count, last_message_at, metadata_json, created_at, updated_at
            FROM conversations
            WHERE instance_id = ? AND participant_id = ?
            "#,
        )
        .bind(&instance_id.0)
        .bind(&participant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| conversation_from_row(&r)).transpose()
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&conversation.metadata)
            .map_err(|e| RepositoryError::Decode(format!("metadata encode: {e}")))?;

        sqlx::query(
            r#"
            UPDATE conversations
            SET status = ?, message_count = ?, unread_count = ?, last_message_at = ?,
                metadata_json = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(conversation.status.as_str())
        .bind(conversation.message_count as i64)
        .bind(conversation.unread_count as i64)
        .bind(conversation.last_message_at.map(|ts| ts.to_rfc3339()))
        .bind(&metadata_json)
        .bind(Utc::now().to_rfc3339())
        .bind(&conversation.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active_for_instance(
        &self,
        instance_id: &AgentInstanceId,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, org_id, instance_id, participant_id, status, message_count,
                unread_count, last_message_at, metadata_json, created_at, updated_at
            FROM conversations
            WHERE instance_id = ? AND status = 'active'
            ORDER BY created_at ASC
            "#,
        )
        .bind(&instance_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(conversation_from_row).collect()
    }
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation, RepositoryError> {
    let status: String = row.try_get("status")?;
    let last_message_at: Option<String> = row.try_get("last_message_at")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let message_count: i64 = row.try_get("message_count")?;
    let unread_count: i64 = row.try_get("unread_count")?;

    Ok(Conversation {
        id: ConversationId(row.try_get("id")?),
        org_id: OrgId(row.try_get("org_id")?),
        instance_id: AgentInstanceId(row.try_get("instance_id")?),
        participant_id: EmployeeId(row.try_get("participant_id")?),
        status: ConversationStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid status: {status}")))?,
        message_count: message_count as u32,
        unread_count: unread_count as u32,
        last_message_at: parse_optional_timestamp("last_message_at", last_message_at)?,
        metadata: parse_json::<ConversationMetadata>("metadata_json", metadata_json)?,
        created_at: parse_timestamp("created_at", created_at)?,
        updated_at: parse_timestamp("updated_at", updated_at)?,
    })
}
