use chrono::{DateTime, Utc};
use sqlx::Row;

use fundflow_core::domain::org::UserId;
use fundflow_core::domain::receiver::{FinalReceiverAssignment, ReceiverStatus};
use fundflow_core::domain::request::RequestId;

use super::{
    parse_optional_timestamp, parse_timestamp, AcknowledgeOutcome, FinalReceiverRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlFinalReceiverRepository {
    pool: DbPool,
}

impl SqlFinalReceiverRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub fn receiver_status_as_str(status: ReceiverStatus) -> &'static str {
    match status {
        ReceiverStatus::Pending => "pending",
        ReceiverStatus::Completed => "completed",
        ReceiverStatus::AutoClosed => "auto_closed",
    }
}

fn parse_status(raw: &str) -> Result<ReceiverStatus, RepositoryError> {
    match raw {
        "pending" => Ok(ReceiverStatus::Pending),
        "completed" => Ok(ReceiverStatus::Completed),
        "auto_closed" => Ok(ReceiverStatus::AutoClosed),
        other => Err(RepositoryError::Decode(format!("unknown receiver status `{other}`"))),
    }
}

fn row_to_assignment(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<FinalReceiverAssignment, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let status_str: String = row.try_get("status").map_err(decode)?;
    let assigned_at_str: String = row.try_get("assigned_at").map_err(decode)?;
    let actioned_at_str: Option<String> = row.try_get("actioned_at").map_err(decode)?;

    Ok(FinalReceiverAssignment {
        id: row.try_get("id").map_err(decode)?,
        request_id: RequestId(row.try_get("request_id").map_err(decode)?),
        user_id: UserId(row.try_get("user_id").map_err(decode)?),
        status: parse_status(&status_str)?,
        assigned_at: parse_timestamp(&assigned_at_str)?,
        actioned_at: parse_optional_timestamp(actioned_at_str)?,
    })
}

#[async_trait::async_trait]
impl FinalReceiverRepository for SqlFinalReceiverRepository {
    async fn insert_assignments(
        &self,
        assignments: &[FinalReceiverAssignment],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for assignment in assignments {
            // OR IGNORE keeps a racing double fan-out idempotent: the
            // (request, user) pair is unique.
            sqlx::query(
                "INSERT OR IGNORE INTO final_receiver_assignment
                     (id, request_id, user_id, status, assigned_at, actioned_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&assignment.id)
            .bind(&assignment.request_id.0)
            .bind(assignment.user_id.0)
            .bind(receiver_status_as_str(assignment.status))
            .bind(assignment.assigned_at.to_rfc3339())
            .bind(assignment.actioned_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn list_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<FinalReceiverAssignment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, user_id, status, assigned_at, actioned_at
             FROM final_receiver_assignment WHERE request_id = ?
             ORDER BY id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_assignment).collect()
    }

    async fn acknowledge(
        &self,
        id: &RequestId,
        user: UserId,
        at: DateTime<Utc>,
    ) -> Result<AcknowledgeOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let completed = sqlx::query(
            "UPDATE final_receiver_assignment
             SET status = 'completed', actioned_at = ?
             WHERE request_id = ? AND user_id = ? AND status = 'pending'",
        )
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .bind(user.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if completed == 0 {
            tx.rollback().await?;
            return Ok(AcknowledgeOutcome::AlreadyClosed);
        }

        sqlx::query(
            "UPDATE final_receiver_assignment
             SET status = 'auto_closed', actioned_at = ?
             WHERE request_id = ? AND status = 'pending'",
        )
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(AcknowledgeOutcome::Completed)
    }
}
