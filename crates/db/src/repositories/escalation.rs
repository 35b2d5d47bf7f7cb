use pulsey_core::domain::conversation::ConversationId;
use pulsey_core::domain::escalation::{
    Escalation, EscalationId, EscalationStatus, EscalationType, Severity,
};
use pulsey_core::domain::message::MessageId;
use pulsey_core::domain::roster::OrgId;
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlEscalationRepository {
    pool: DbPool,
}

impl SqlEscalationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl super::EscalationRepository for SqlEscalationRepository {
    async fn create(&self, escalation: Escalation) -> Result<Escalation, RepositoryError> {
        // The unique message_id index enforces at-most-one escalation per
        // triggering message.
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO escalations (
                id, org_id, conversation_id, message_id, escalation_type, severity,
                status, description, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&escalation.id.0)
        .bind(&escalation.org_id.0)
        .bind(&escalation.conversation_id.0)
        .bind(&escalation.message_id.0)
        .bind(escalation.escalation_type.as_str())
        .bind(escalation.severity.as_str())
        .bind(escalation.status.as_str())
        .bind(&escalation.description)
        .bind(escalation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT id, org_id, conversation_id, message_id, escalation_type, severity,
                   status, description, created_at
            FROM escalations
            WHERE message_id = ?
            "#,
        )
        .bind(&escalation.message_id.0)
        .fetch_one(&self.pool)
        .await?;

        escalation_from_row(&row)
    }

    async fn list_open_for_org(&self, org_id: &OrgId) -> Result<Vec<Escalation>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, conversation_id, message_id, escalation_type, severity,
                   status, description, created_at
            FROM escalations
            WHERE org_id = ? AND status = 'open'
            ORDER BY created_at DESC
            "#,
        )
        .bind(&org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(escalation_from_row).collect()
    }
}

fn escalation_from_row(row: &SqliteRow) -> Result<Escalation, RepositoryError> {
    let escalation_type: String = row.try_get("escalation_type")?;
    let severity: String = row.try_get("severity")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Escalation {
        id: EscalationId(row.try_get("id")?),
        org_id: OrgId(row.try_get("org_id")?),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        message_id: MessageId(row.try_get("message_id")?),
        escalation_type: EscalationType::parse(&escalation_type).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid escalation_type: {escalation_type}"))
        })?,
        severity: Severity::parse(&severity)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid severity: {severity}")))?,
        status: EscalationStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid status: {status}")))?,
        description: row.try_get("description")?,
        created_at: parse_timestamp("created_at", created_at)?,
    })
}
