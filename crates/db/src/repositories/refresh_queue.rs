use chrono::{DateTime, Utc};
use pulsey_core::domain::conversation::ConversationId;
use pulsey_core::domain::refresh::{RefreshJobId, RefreshJobState, SummaryRefreshJob};
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlRefreshJobRepository {
    pool: DbPool,
}

impl SqlRefreshJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl super::RefreshJobRepository for SqlRefreshJobRepository {
    async fn enqueue(&self, job: SummaryRefreshJob) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO summary_refresh_jobs (
                id, conversation_id, state, attempt_count, max_attempts, available_at,
                last_error, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id.0)
        .bind(&job.conversation_id.0)
        .bind(job.state.as_str())
        .bind(job.attempt_count as i64)
        .bind(job.max_attempts as i64)
        .bind(job.available_at.to_rfc3339())
        .bind(&job.last_error)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<SummaryRefreshJob>, RepositoryError> {
        let candidate = sqlx::query(
            r#"
            SELECT id, conversation_id, state, attempt_count, max_attempts, available_at,
                   last_error, created_at, updated_at
            FROM summary_refresh_jobs
            WHERE state IN ('queued', 'retryable_failed') AND available_at <= ?
            ORDER BY available_at ASC
            LIMIT 1
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = candidate else {
            return Ok(None);
        };
        let mut job = job_from_row(&row)?;

        // Guarded update: another worker may have claimed the job between
        // the select and here, in which case this touches zero rows.
        let claimed = sqlx::query(
            r#"
            UPDATE summary_refresh_jobs
            SET state = 'running', attempt_count = attempt_count + 1, updated_at = ?
            WHERE id = ? AND state IN ('queued', 'retryable_failed')
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(&job.id.0)
        .execute(&self.pool)
        .await?;

        if claimed.rows_affected() == 0 {
            return Ok(None);
        }

        job.state = RefreshJobState::Running;
        job.attempt_count += 1;
        job.updated_at = now;
        Ok(Some(job))
    }

    async fn complete(&self, id: &RefreshJobId) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE summary_refresh_jobs
            SET state = 'completed', last_error = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reschedule(
        &self,
        id: &RefreshJobId,
        available_at: DateTime<Utc>,
        error: String,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE summary_refresh_jobs
            SET state = 'retryable_failed', available_at = ?, last_error = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(available_at.to_rfc3339())
        .bind(&error)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn park(&self, id: &RefreshJobId, error: String) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE summary_refresh_jobs
            SET state = 'failed_terminal', last_error = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&error)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn job_from_row(row: &SqliteRow) -> Result<SummaryRefreshJob, RepositoryError> {
    let state: String = row.try_get("state")?;
    let available_at: String = row.try_get("available_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let attempt_count: i64 = row.try_get("attempt_count")?;
    let max_attempts: i64 = row.try_get("max_attempts")?;

    Ok(SummaryRefreshJob {
        id: RefreshJobId(row.try_get("id")?),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        state: RefreshJobState::parse(&state)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid state: {state}")))?,
        attempt_count: attempt_count as u32,
        max_attempts: max_attempts as u32,
        available_at: parse_timestamp("available_at", available_at)?,
        last_error: row.try_get("last_error")?,
        created_at: parse_timestamp("created_at", created_at)?,
        updated_at: parse_timestamp("updated_at", updated_at)?,
    })
}
