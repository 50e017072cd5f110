use sqlx::Row;

use fundflow_core::directory::OrgDirectory;
use fundflow_core::domain::org::{
    DepartmentId, Designation, DesignationId, ProjectId, ProjectMember, UserId, UserProfile,
};

use super::{OrgRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrgRepository {
    pool: DbPool,
}

impl SqlOrgRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_users(&self) -> Result<Vec<UserProfile>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, email, designation_id, department_id, project_id
             FROM app_user ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                Ok(UserProfile {
                    id: UserId(row.try_get("id").map_err(decode)?),
                    name: row.try_get("name").map_err(decode)?,
                    email: row.try_get("email").map_err(decode)?,
                    designation_id: row
                        .try_get::<Option<i64>, _>("designation_id")
                        .map_err(decode)?
                        .map(DesignationId),
                    department_id: row
                        .try_get::<Option<i64>, _>("department_id")
                        .map_err(decode)?
                        .map(DepartmentId),
                    project_id: row
                        .try_get::<Option<i64>, _>("project_id")
                        .map_err(decode)?
                        .map(ProjectId),
                })
            })
            .collect()
    }

    async fn load_designations(&self) -> Result<Vec<Designation>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name FROM designation ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                Ok(Designation {
                    id: DesignationId(row.try_get("id").map_err(decode)?),
                    name: row.try_get("name").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn load_project_members(&self) -> Result<Vec<ProjectMember>, RepositoryError> {
        let rows = sqlx::query("SELECT project_id, email FROM user_project")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                Ok(ProjectMember {
                    project_id: ProjectId(row.try_get("project_id").map_err(decode)?),
                    email: row.try_get("email").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn load_pending_counts(&self) -> Result<Vec<(UserId, i64)>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT approver_id, COUNT(*) AS pending
             FROM approval WHERE status = 'pending'
             GROUP BY approver_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                Ok((
                    UserId(row.try_get("approver_id").map_err(decode)?),
                    row.try_get("pending").map_err(decode)?,
                ))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl OrgRepository for SqlOrgRepository {
    async fn load_directory(&self) -> Result<OrgDirectory, RepositoryError> {
        let users = self.load_users().await?;
        let designations = self.load_designations().await?;
        let project_members = self.load_project_members().await?;
        let pending_counts = self.load_pending_counts().await?;

        Ok(OrgDirectory::new(users, designations, project_members, pending_counts))
    }
}

#[cfg(test)]
mod tests {
    use fundflow_core::domain::org::{DesignationId, ProjectId, UserId};

    use super::SqlOrgRepository;
    use crate::fixtures::DemoSeed;
    use crate::repositories::OrgRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn directory_snapshot_reflects_seeded_rows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeed::load(&pool).await.expect("seed");

        let directory = SqlOrgRepository::new(pool).load_directory().await.expect("snapshot");

        let finance = directory.users_with_designation(DesignationId(7));
        assert_eq!(finance.len(), 2, "two seeded finance managers");
        assert!(directory.is_project_member(ProjectId(3), "bo@example.com"));
        assert_eq!(directory.pending_count(UserId(21)), 0);
        assert_eq!(directory.designation_of_username("Asha Rao"), Some(DesignationId(7)));
    }
}
