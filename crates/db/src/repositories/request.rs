use chrono::{DateTime, Utc};
use sqlx::Row;

use fundflow_core::domain::org::{DepartmentId, ProjectId, UserId};
use fundflow_core::domain::request::{FundRequest, RequestField, RequestId, RequestStatus};
use fundflow_core::domain::workflow::WorkflowId;

use super::{parse_timestamp, FundRequestRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFundRequestRepository {
    pool: DbPool,
}

impl SqlFundRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub fn request_status_as_str(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "pending",
        RequestStatus::Approved => "approved",
        RequestStatus::Rejected => "rejected",
        RequestStatus::SentBack => "sent_back",
    }
}

fn parse_status(raw: &str) -> Result<RequestStatus, RepositoryError> {
    match raw {
        "pending" => Ok(RequestStatus::Pending),
        "approved" => Ok(RequestStatus::Approved),
        "rejected" => Ok(RequestStatus::Rejected),
        "sent_back" => Ok(RequestStatus::SentBack),
        other => Err(RepositoryError::Decode(format!("unknown request status `{other}`"))),
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<FundRequest, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let title: String = row.try_get("title").map_err(decode)?;
    let description: String = row.try_get("description").map_err(decode)?;
    let amount_str: String = row.try_get("amount").map_err(decode)?;
    let initiator_id: i64 = row.try_get("initiator_id").map_err(decode)?;
    let workflow_id: i64 = row.try_get("workflow_id").map_err(decode)?;
    let department_id: Option<i64> = row.try_get("department_id").map_err(decode)?;
    let project_id: Option<i64> = row.try_get("project_id").map_err(decode)?;
    let status_str: String = row.try_get("status").map_err(decode)?;
    let current_level: i32 = row.try_get("current_level").map_err(decode)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(decode)?;

    let amount = amount_str
        .parse()
        .map_err(|e| RepositoryError::Decode(format!("invalid amount `{amount_str}`: {e}")))?;

    Ok(FundRequest {
        id: RequestId(id),
        title,
        description,
        amount,
        initiator_id: UserId(initiator_id),
        workflow_id: WorkflowId(workflow_id),
        department_id: department_id.map(DepartmentId),
        project_id: project_id.map(ProjectId),
        status: parse_status(&status_str)?,
        current_level,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

#[async_trait::async_trait]
impl FundRequestRepository for SqlFundRequestRepository {
    async fn insert(&self, request: &FundRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO fund_request (id, title, description, amount, initiator_id,
                                       workflow_id, department_id, project_id, status,
                                       current_level, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.amount.to_string())
        .bind(request.initiator_id.0)
        .bind(request.workflow_id.0)
        .bind(request.department_id.map(|d| d.0))
        .bind(request.project_id.map(|p| p.0))
        .bind(request_status_as_str(request.status))
        .bind(request.current_level)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<FundRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, title, description, amount, initiator_id, workflow_id,
                    department_id, project_id, status, current_level, created_at, updated_at
             FROM fund_request WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        id: &RequestId,
        status: RequestStatus,
        current_level: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE fund_request SET status = ?, current_level = ?, updated_at = ? WHERE id = ?",
        )
        .bind(request_status_as_str(status))
        .bind(current_level)
        .bind(updated_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_fields(
        &self,
        id: &RequestId,
        fields: &[(String, String)],
        revision: i32,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for (name, value) in fields {
            sqlx::query(
                "INSERT INTO request_field (request_id, name, value, revision) VALUES (?, ?, ?, ?)",
            )
            .bind(&id.0)
            .bind(name)
            .bind(value)
            .bind(revision)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn list_fields(&self, id: &RequestId) -> Result<Vec<RequestField>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT request_id, name, value, revision
             FROM request_field WHERE request_id = ?
             ORDER BY revision ASC, id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                Ok(RequestField {
                    request_id: RequestId(row.try_get("request_id").map_err(decode)?),
                    name: row.try_get("name").map_err(decode)?,
                    value: row.try_get("value").map_err(decode)?,
                    revision: row.try_get("revision").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn next_field_revision(&self, id: &RequestId) -> Result<i32, RepositoryError> {
        let row = sqlx::query(
            "SELECT IFNULL(MAX(revision), -1) AS max_revision
             FROM request_field WHERE request_id = ?",
        )
        .bind(&id.0)
        .fetch_one(&self.pool)
        .await?;

        let max_revision: i32 =
            row.try_get("max_revision").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(max_revision + 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use fundflow_core::domain::org::UserId;
    use fundflow_core::domain::request::{FundRequest, RequestId, RequestStatus};
    use fundflow_core::domain::workflow::WorkflowId;

    use super::SqlFundRequestRepository;
    use crate::fixtures::DemoSeed;
    use crate::repositories::FundRequestRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeed::load(&pool).await.expect("seed");
        pool
    }

    fn sample_request(id: &str) -> FundRequest {
        let now = Utc::now();
        FundRequest {
            id: RequestId(id.to_string()),
            title: "Team offsite".to_string(),
            description: "Q3 planning offsite".to_string(),
            amount: Decimal::new(125_000, 2),
            initiator_id: UserId(10),
            workflow_id: WorkflowId(1),
            department_id: None,
            project_id: None,
            status: RequestStatus::Pending,
            current_level: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trips_amount_and_status() {
        let pool = setup().await;
        let repo = SqlFundRequestRepository::new(pool);

        let request = sample_request("req-001");
        repo.insert(&request).await.expect("insert");

        let found = repo
            .find_by_id(&RequestId("req-001".to_string()))
            .await
            .expect("find")
            .expect("should exist");
        assert_eq!(found.amount, Decimal::new(125_000, 2));
        assert_eq!(found.status, RequestStatus::Pending);
        assert_eq!(found.current_level, 0);
    }

    #[tokio::test]
    async fn update_status_moves_level_and_status() {
        let pool = setup().await;
        let repo = SqlFundRequestRepository::new(pool);

        let request = sample_request("req-001");
        repo.insert(&request).await.expect("insert");
        repo.update_status(&request.id, RequestStatus::SentBack, 1, Utc::now())
            .await
            .expect("update");

        let found = repo.find_by_id(&request.id).await.expect("find").expect("exists");
        assert_eq!(found.status, RequestStatus::SentBack);
        assert_eq!(found.current_level, 1);
    }

    #[tokio::test]
    async fn field_revisions_append_rather_than_rewrite() {
        let pool = setup().await;
        let repo = SqlFundRequestRepository::new(pool);

        let request = sample_request("req-001");
        repo.insert(&request).await.expect("insert");

        assert_eq!(repo.next_field_revision(&request.id).await.expect("revision"), 0);
        repo.append_fields(
            &request.id,
            &[("cost_center".to_string(), "CC-204".to_string())],
            0,
        )
        .await
        .expect("append rev 0");

        assert_eq!(repo.next_field_revision(&request.id).await.expect("revision"), 1);
        repo.append_fields(
            &request.id,
            &[("cost_center".to_string(), "CC-207".to_string())],
            1,
        )
        .await
        .expect("append rev 1");

        let fields = repo.list_fields(&request.id).await.expect("list");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].revision, 0);
        assert_eq!(fields[1].value, "CC-207");
    }
}
