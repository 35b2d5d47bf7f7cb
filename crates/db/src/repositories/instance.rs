use chrono::{DateTime, Utc};
use pulsey_core::domain::instance::{
    AgentInstance, AgentInstanceConfig, AgentInstanceId, AgentSchedule, InstanceStatus,
    ScheduleCadence,
};
use pulsey_core::domain::roster::OrgId;
use pulsey_core::domain::template::{AgentKind, AgentTemplate, AgentTemplateId};
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_json, parse_optional_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlInstanceRepository {
    pool: DbPool,
}

impl SqlInstanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl super::InstanceRepository for SqlInstanceRepository {
    async fn create_template(&self, template: AgentTemplate) -> Result<(), RepositoryError> {
        let default_config_json = serde_json::to_string(&template.default_config)
            .map_err(|e| RepositoryError::Decode(format!("default config encode: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO agent_templates (
                id, kind, name, base_prompt, default_config_json, published_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&template.id.0)
        .bind(template.kind.as_str())
        .bind(&template.name)
        .bind(&template.base_prompt)
        .bind(&default_config_json)
        .bind(template.published_at.map(|ts| ts.to_rfc3339()))
        .bind(template.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_template(
        &self,
        id: &AgentTemplateId,
    ) -> Result<Option<AgentTemplate>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, name, base_prompt, default_config_json, published_at, created_at
            FROM agent_templates
            WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| template_from_row(&r)).transpose()
    }

    async fn create_instance(&self, instance: AgentInstance) -> Result<(), RepositoryError> {
        let config_json = serde_json::to_string(&instance.config)
            .map_err(|e| RepositoryError::Decode(format!("config encode: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO agent_instances (
                id, org_id, template_id, name, config_json, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instance.id.0)
        .bind(&instance.org_id.0)
        .bind(&instance.template_id.0)
        .bind(&instance.name)
        .bind(&config_json)
        .bind(instance.status.as_str())
        .bind(instance.created_at.to_rfc3339())
        .bind(instance.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_instance(
        &self,
        id: &AgentInstanceId,
    ) -> Result<Option<AgentInstance>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, template_id, name, config_json, status, created_at, updated_at
            FROM agent_instances
            WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| instance_from_row(&r)).transpose()
    }

    async fn update_instance(&self, instance: &AgentInstance) -> Result<(), RepositoryError> {
        let config_json = serde_json::to_string(&instance.config)
            .map_err(|e| RepositoryError::Decode(format!("config encode: {e}")))?;

        sqlx::query(
            r#"
            UPDATE agent_instances
            SET name = ?, config_json = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&instance.name)
        .bind(&config_json)
        .bind(instance.status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&instance.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_schedule(&self, schedule: AgentSchedule) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO agent_schedules (instance_id, cadence, next_run_at, last_run_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&schedule.instance_id.0)
        .bind(schedule.cadence.as_str())
        .bind(schedule.next_run_at.map(|ts| ts.to_rfc3339()))
        .bind(schedule.last_run_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_schedule(
        &self,
        instance_id: &AgentInstanceId,
    ) -> Result<Option<AgentSchedule>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT instance_id, cadence, next_run_at, last_run_at
            FROM agent_schedules
            WHERE instance_id = ?
            "#,
        )
        .bind(&instance_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| schedule_from_row(&r)).transpose()
    }

    async fn update_schedule(&self, schedule: &AgentSchedule) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE agent_schedules
            SET cadence = ?, next_run_at = ?, last_run_at = ?
            WHERE instance_id = ?
            "#,
        )
        .bind(schedule.cadence.as_str())
        .bind(schedule.next_run_at.map(|ts| ts.to_rfc3339()))
        .bind(schedule.last_run_at.map(|ts| ts.to_rfc3339()))
        .bind(&schedule.instance_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_due_schedules(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AgentSchedule>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT instance_id, cadence, next_run_at, last_run_at
            FROM agent_schedules
            WHERE next_run_at IS NOT NULL AND next_run_at <= ?
            ORDER BY next_run_at ASC
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(schedule_from_row).collect()
    }
}

fn template_from_row(row: &SqliteRow) -> Result<AgentTemplate, RepositoryError> {
    let kind: String = row.try_get("kind")?;
    let default_config_json: String = row.try_get("default_config_json")?;
    let published_at: Option<String> = row.try_get("published_at")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(AgentTemplate {
        id: AgentTemplateId(row.try_get("id")?),
        kind: AgentKind::parse(&kind)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid kind: {kind}")))?,
        name: row.try_get("name")?,
        base_prompt: row.try_get("base_prompt")?,
        default_config: parse_json::<AgentInstanceConfig>(
            "default_config_json",
            default_config_json,
        )?,
        published_at: parse_optional_timestamp("published_at", published_at)?,
        created_at: parse_timestamp("created_at", created_at)?,
    })
}

fn instance_from_row(row: &SqliteRow) -> Result<AgentInstance, RepositoryError> {
    let config_json: String = row.try_get("config_json")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(AgentInstance {
        id: AgentInstanceId(row.try_get("id")?),
        org_id: OrgId(row.try_get("org_id")?),
        template_id: AgentTemplateId(row.try_get("template_id")?),
        name: row.try_get("name")?,
        config: parse_json::<AgentInstanceConfig>("config_json", config_json)?,
        status: InstanceStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid status: {status}")))?,
        created_at: parse_timestamp("created_at", created_at)?,
        updated_at: parse_timestamp("updated_at", updated_at)?,
    })
}

fn schedule_from_row(row: &SqliteRow) -> Result<AgentSchedule, RepositoryError> {
    let cadence: String = row.try_get("cadence")?;
    let next_run_at: Option<String> = row.try_get("next_run_at")?;
    let last_run_at: Option<String> = row.try_get("last_run_at")?;

    Ok(AgentSchedule {
        instance_id: AgentInstanceId(row.try_get("instance_id")?),
        cadence: ScheduleCadence::parse(&cadence)
            .ok_or_else(|| RepositoryError::Decode(format!("invalid cadence: {cadence}")))?,
        next_run_at: parse_optional_timestamp("next_run_at", next_run_at)?,
        last_run_at: parse_optional_timestamp("last_run_at", last_run_at)?,
    })
}
