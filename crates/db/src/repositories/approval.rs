use chrono::{DateTime, Utc};
use sqlx::Row;

use fundflow_core::domain::approval::{Approval, ApprovalId, ApprovalStatus};
use fundflow_core::domain::org::UserId;
use fundflow_core::domain::request::RequestId;

use super::{
    conflict_on_unique, parse_optional_timestamp, parse_timestamp, ApprovalRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Current pending-row count per approver, feeding the least-busy
    /// tie-break.
    pub async fn pending_counts(&self) -> Result<Vec<(UserId, i64)>, RepositoryError> {
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
                Ok((UserId(row.try_get("approver_id").map_err(decode)?), row.try_get("pending").map_err(decode)?))
            })
            .collect()
    }
}

pub fn approval_status_as_str(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
        ApprovalStatus::SentBack => "sent_back",
        ApprovalStatus::FinalReceiver => "final_receiver",
    }
}

fn parse_status(raw: &str) -> Result<ApprovalStatus, RepositoryError> {
    match raw {
        "pending" => Ok(ApprovalStatus::Pending),
        "approved" => Ok(ApprovalStatus::Approved),
        "rejected" => Ok(ApprovalStatus::Rejected),
        "sent_back" => Ok(ApprovalStatus::SentBack),
        "final_receiver" => Ok(ApprovalStatus::FinalReceiver),
        other => Err(RepositoryError::Decode(format!("unknown approval status `{other}`"))),
    }
}

fn row_to_approval(row: &sqlx::sqlite::SqliteRow) -> Result<Approval, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let request_id: String = row.try_get("request_id").map_err(decode)?;
    let level: i32 = row.try_get("level").map_err(decode)?;
    let approver_id: i64 = row.try_get("approver_id").map_err(decode)?;
    let status_str: String = row.try_get("status").map_err(decode)?;
    let comment: Option<String> = row.try_get("comment").map_err(decode)?;
    let overridden_user_id: Option<i64> = row.try_get("overridden_user_id").map_err(decode)?;
    let assigned_at_str: String = row.try_get("assigned_at").map_err(decode)?;
    let actioned_at_str: Option<String> = row.try_get("actioned_at").map_err(decode)?;
    let approved_at_str: Option<String> = row.try_get("approved_at").map_err(decode)?;

    Ok(Approval {
        id: ApprovalId(id),
        request_id: RequestId(request_id),
        level,
        approver_id: UserId(approver_id),
        status: parse_status(&status_str)?,
        comment,
        overridden_user_id: overridden_user_id.map(UserId),
        assigned_at: parse_timestamp(&assigned_at_str)?,
        actioned_at: parse_optional_timestamp(actioned_at_str)?,
        approved_at: parse_optional_timestamp(approved_at_str)?,
    })
}

const SELECT_COLUMNS: &str = "id, request_id, level, approver_id, status, comment,
                              overridden_user_id, assigned_at, actioned_at, approved_at";

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn insert_pending(&self, approval: &Approval) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval (id, request_id, level, approver_id, status, comment,
                                   overridden_user_id, assigned_at, actioned_at, approved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&approval.id.0)
        .bind(&approval.request_id.0)
        .bind(approval.level)
        .bind(approval.approver_id.0)
        .bind(approval_status_as_str(approval.status))
        .bind(&approval.comment)
        .bind(approval.overridden_user_id.map(|u| u.0))
        .bind(approval.assigned_at.to_rfc3339())
        .bind(approval.actioned_at.map(|t| t.to_rfc3339()))
        .bind(approval.approved_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(
                e,
                &format!(
                    "pending approval already exists for request {} level {}",
                    approval.request_id.0, approval.level
                ),
            )
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<Approval>, RepositoryError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM approval WHERE id = ?");
        let row = sqlx::query(&query).bind(&id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(row_to_approval(r)?)),
            None => Ok(None),
        }
    }

    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<Approval>, RepositoryError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM approval
             WHERE request_id = ? ORDER BY level ASC, assigned_at ASC"
        );
        let rows = sqlx::query(&query).bind(&id.0).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_approval).collect()
    }

    async fn list_pending_for_level(
        &self,
        id: &RequestId,
        level: i32,
    ) -> Result<Vec<Approval>, RepositoryError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM approval
             WHERE request_id = ? AND level = ? AND status = 'pending'"
        );
        let rows = sqlx::query(&query).bind(&id.0).bind(level).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_approval).collect()
    }

    async fn record_decision(
        &self,
        id: &ApprovalId,
        status: ApprovalStatus,
        comment: Option<&str>,
        actioned_at: DateTime<Utc>,
        approved_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        // Compare-and-set: a row that already left `pending` stays as it is,
        // so a racing second decision quietly changes nothing.
        sqlx::query(
            "UPDATE approval SET status = ?, comment = ?, actioned_at = ?, approved_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(approval_status_as_str(status))
        .bind(comment)
        .bind(actioned_at.to_rfc3339())
        .bind(approved_at.map(|t| t.to_rfc3339()))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
