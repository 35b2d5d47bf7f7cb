use pulsey_core::domain::instance::AgentInstanceId;
use pulsey_core::domain::run::{AgentRun, AgentRunId, RunStatus, RunType};
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_optional_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlRunRepository {
    pool: DbPool,
}

impl SqlRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl super::RunRepository for SqlRunRepository {
    async fn create(&self, run: AgentRun) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO agent_runs (
                id, instance_id, run_type, status, messages_sent,
                conversations_touched, error, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id.0)
        .bind(&run.instance_id.0)
        .bind(run.run_type.as_str())
        .bind(run.status.as_str())
        .bind(run.messages_sent as i64)
        .bind(run.conversations_touched as i64)
        .bind(&run.error)
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, run: &AgentRun) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE agent_runs
            SET status = ?, messages_sent = ?, conversations_touched = ?, error = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(run.status.as_str())
        .bind(run.messages_sent as i64)
        .bind(run.conversations_touched as i64)
        .bind(&run.error)
        .bind(run.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(&run.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &AgentRunId) -> Result<Option<AgentRun>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, instance_id, run_type, status, messages_sent,
                   conversations_touched, error, started_at, completed_at
            FROM agent_runs
            WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| run_from_row(&r)).transpose()
    }
}

fn run_from_row(row: &SqliteRow) -> Result<AgentRun, RepositoryError> {
    let run_type: String = row.try_get("run_type")?;
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    let messages_sent: i64 = row.try_get("messages_sent")?;
    let conversations_touched: i64 = row.try_get("conversations_touched")?;

    Ok(AgentRun {
        id: AgentRunId(row.try_get("id")?),
        instance_id: AgentInstanceId(row.try_get("instance_id")?),
        run_type: RunType::parse(&run_type)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid run_type: {run_type}")))?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid status: {status}")))?,
        messages_sent: messages_sent as u32,
        conversations_touched: conversations_touched as u32,
        error: row.try_get("error")?,
        started_at: parse_timestamp("started_at", started_at)?,
        completed_at: parse_optional_timestamp("completed_at", completed_at)?,
    })
}
