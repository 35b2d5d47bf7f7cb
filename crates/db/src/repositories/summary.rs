use chrono::{DateTime, Utc};
use pulsey_core::domain::conversation::ConversationId;
use pulsey_core::domain::message::MessageId;
use pulsey_core::domain::roster::OrgId;
use pulsey_core::domain::summary::{ActionItem, FeedbackSummary, FeedbackSummaryId, Sentiment};
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_json, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlSummaryRepository {
    pool: DbPool,
}

impl SqlSummaryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl super::SummaryRepository for SqlSummaryRepository {
    async fn append(&self, summary: FeedbackSummary) -> Result<(), RepositoryError> {
        let topics_json = serde_json::to_string(&summary.topics)
            .map_err(|e| RepositoryError::Decode(format!("topics encode: {e}")))?;
        let action_items_json = serde_json::to_string(&summary.action_items)
            .map_err(|e| RepositoryError::Decode(format!("action items encode: {e}")))?;
        let key_quotes_json = serde_json::to_string(&summary.key_quotes)
            .map_err(|e| RepositoryError::Decode(format!("key quotes encode: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO feedback_summaries (
                id, conversation_id, sentiment, score, topics_json, action_items_json,
                key_quotes_json, summary_text, delta_notes, previous_summary_id,
                first_message_id, last_message_id, message_count, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&summary.id.0)
        .bind(&summary.conversation_id.0)
        .bind(summary.sentiment.as_str())
        .bind(summary.score)
        .bind(&topics_json)
        .bind(&action_items_json)
        .bind(&key_quotes_json)
        .bind(&summary.summary_text)
        .bind(&summary.delta_notes)
        .bind(summary.previous_summary_id.as_ref().map(|id| &id.0))
        .bind(summary.first_message_id.as_ref().map(|id| &id.0))
        .bind(summary.last_message_id.as_ref().map(|id| &id.0))
        .bind(summary.message_count as i64)
        .bind(summary.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &FeedbackSummaryId,
    ) -> Result<Option<FeedbackSummary>, RepositoryError> {
        let row = sqlx::query(&select_sql("WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| summary_from_row(&r)).transpose()
    }

    async fn latest_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<FeedbackSummary>, RepositoryError> {
        let row = sqlx::query(&select_sql(
            "WHERE conversation_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        ))
        .bind(&conversation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| summary_from_row(&r)).transpose()
    }

    async fn list_for_org_since(
        &self,
        org_id: &OrgId,
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedbackSummary>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                s.id, s.conversation_id, s.sentiment, s.score, s.topics_json,
                s.action_items_json, s.key_quotes_json, s.summary_text, s.delta_notes,
                s.previous_summary_id, s.first_message_id, s.last_message_id,
                s.message_count, s.created_at
            FROM feedback_summaries s
            JOIN conversations c ON c.id = s.conversation_id
            WHERE c.org_id = ? AND s.created_at >= ?
            ORDER BY s.created_at ASC
            "#,
        )
        .bind(&org_id.0)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }
}

fn select_sql(suffix: &str) -> String {
    format!(
        "SELECT id, conversation_id, sentiment, score, topics_json, action_items_json, \
         key_quotes_json, summary_text, delta_notes, previous_summary_id, first_message_id, \
         last_message_id, message_count, created_at FROM feedback_summaries {suffix}"
    )
}

fn summary_from_row(row: &SqliteRow) -> Result<FeedbackSummary, RepositoryError> {
    let sentiment: String = row.try_get("sentiment")?;
    let topics_json: String = row.try_get("topics_json")?;
    let action_items_json: String = row.try_get("action_items_json")?;
    let key_quotes_json: String = row.try_get("key_quotes_json")?;
    let previous_summary_id: Option<String> = row.try_get("previous_summary_id")?;
    let first_message_id: Option<String> = row.try_get("first_message_id")?;
    let last_message_id: Option<String> = row.try_get("last_message_id")?;
    let created_at: String = row.try_get("created_at")?;
    let message_count: i64 = row.try_get("message_count")?;

    Ok(FeedbackSummary {
        id: FeedbackSummaryId(row.try_get("id")?),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        sentiment: Sentiment::parse(&sentiment)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid sentiment: {sentiment}")))?,
        score: row.try_get("score")?,
        topics: parse_json::<Vec<String>>("topics_json", topics_json)?,
        action_items: parse_json::<Vec<ActionItem>>("action_items_json", action_items_json)?,
        key_quotes: parse_json::<Vec<String>>("key_quotes_json", key_quotes_json)?,
        summary_text: row.try_get("summary_text")?,
        delta_notes: row.try_get("delta_notes")?,
        previous_summary_id: previous_summary_id.map(FeedbackSummaryId),
        first_message_id: first_message_id.map(MessageId),
        last_message_id: last_message_id.map(MessageId),
        message_count: message_count as u32,
        created_at: parse_timestamp("created_at", created_at)?,
    })
}
