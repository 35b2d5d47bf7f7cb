use pulsey_core::domain::instance::AudienceConfig;
use pulsey_core::domain::roster::{EmployeeId, OrgId, OrgMember};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlRosterRepository {
    pool: DbPool,
}

impl SqlRosterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl super::RosterRepository for SqlRosterRepository {
    async fn upsert_member(&self, member: OrgMember) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO org_members (id, org_id, name, email, department, active)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (org_id, id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                department = excluded.department,
                active = excluded.active
            "#,
        )
        .bind(&member.id.0)
        .bind(&member.org_id.0)
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.department)
        .bind(member.active as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_member(
        &self,
        org_id: &OrgId,
        id: &EmployeeId,
    ) -> Result<Option<OrgMember>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, name, email, department, active
            FROM org_members
            WHERE org_id = ? AND id = ?
            "#,
        )
        .bind(&org_id.0)
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| member_from_row(&r)).transpose()
    }

    async fn list_audience(
        &self,
        org_id: &OrgId,
        audience: &AudienceConfig,
    ) -> Result<Vec<OrgMember>, RepositoryError> {
        let mut builder = QueryBuilder::new(
            "SELECT id, org_id, name, email, department, active FROM org_members \
             WHERE active = 1 AND org_id = ",
        );
        builder.push_bind(&org_id.0);

        match audience {
            AudienceConfig::CompanyWide => {}
            AudienceConfig::Departments { departments } => {
                if departments.is_empty() {
                    return Ok(Vec::new());
                }
                builder.push(" AND department IN (");
                let mut separated = builder.separated(", ");
                for department in departments {
                    separated.push_bind(department);
                }
                separated.push_unseparated(")");
            }
            AudienceConfig::Employees { employee_ids } => {
                if employee_ids.is_empty() {
                    return Ok(Vec::new());
                }
                builder.push(" AND id IN (");
                let mut separated = builder.separated(", ");
                for employee_id in employee_ids {
                    separated.push_bind(&employee_id.0);
                }
                separated.push_unseparated(")");
            }
        }

        builder.push(" ORDER BY name ASC");
        let rows = builder.build().fetch_all(&self.pool).await?;

        rows.iter().map(member_from_row).collect()
    }
}

fn member_from_row(row: &SqliteRow) -> Result<OrgMember, RepositoryError> {
    let active: i64 = row.try_get("active")?;

    Ok(OrgMember {
        id: EmployeeId(row.try_get("id")?),
        org_id: OrgId(row.try_get("org_id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        department: row.try_get("department")?,
        active: active != 0,
    })
}
