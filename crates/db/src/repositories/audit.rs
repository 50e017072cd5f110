use std::collections::BTreeMap;

use sqlx::Row;

use fundflow_core::audit::{AuditCategory, AuditOutcome, RequestAuditEvent};
use fundflow_core::domain::request::RequestId;

use super::{parse_timestamp, AuditEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditEventRepository {
    pool: DbPool,
}

impl SqlAuditEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn category_as_str(category: &AuditCategory) -> &'static str {
    match category {
        AuditCategory::Request => "request",
        AuditCategory::Routing => "routing",
        AuditCategory::Receiver => "receiver",
        AuditCategory::Notification => "notification",
    }
}

fn parse_category(raw: &str) -> Result<AuditCategory, RepositoryError> {
    match raw {
        "request" => Ok(AuditCategory::Request),
        "routing" => Ok(AuditCategory::Routing),
        "receiver" => Ok(AuditCategory::Receiver),
        "notification" => Ok(AuditCategory::Notification),
        other => Err(RepositoryError::Decode(format!("unknown audit category `{other}`"))),
    }
}

fn outcome_as_str(outcome: &AuditOutcome) -> &'static str {
    match outcome {
        AuditOutcome::Success => "success",
        AuditOutcome::Rejected => "rejected",
        AuditOutcome::Failed => "failed",
    }
}

fn parse_outcome(raw: &str) -> Result<AuditOutcome, RepositoryError> {
    match raw {
        "success" => Ok(AuditOutcome::Success),
        "rejected" => Ok(AuditOutcome::Rejected),
        "failed" => Ok(AuditOutcome::Failed),
        other => Err(RepositoryError::Decode(format!("unknown audit outcome `{other}`"))),
    }
}

#[async_trait::async_trait]
impl AuditEventRepository for SqlAuditEventRepository {
    async fn append(&self, event: &RequestAuditEvent) -> Result<(), RepositoryError> {
        let metadata = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Decode(format!("metadata encode failed: {e}")))?;

        sqlx::query(
            "INSERT INTO request_audit_event
                 (event_id, request_id, correlation_id, event_type, category,
                  actor, outcome, metadata, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.request_id.as_ref().map(|id| id.0.clone()))
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(category_as_str(&event.category))
        .bind(&event.actor)
        .bind(outcome_as_str(&event.outcome))
        .bind(metadata)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<RequestAuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT event_id, request_id, correlation_id, event_type, category,
                    actor, outcome, metadata, occurred_at
             FROM request_audit_event WHERE request_id = ?
             ORDER BY occurred_at ASC, event_id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                let category_str: String = row.try_get("category").map_err(decode)?;
                let outcome_str: String = row.try_get("outcome").map_err(decode)?;
                let metadata_str: String = row.try_get("metadata").map_err(decode)?;
                let occurred_at_str: String = row.try_get("occurred_at").map_err(decode)?;
                let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_str)
                    .map_err(|e| {
                        RepositoryError::Decode(format!("metadata decode failed: {e}"))
                    })?;

                Ok(RequestAuditEvent {
                    event_id: row.try_get("event_id").map_err(decode)?,
                    request_id: row
                        .try_get::<Option<String>, _>("request_id")
                        .map_err(decode)?
                        .map(RequestId),
                    correlation_id: row.try_get("correlation_id").map_err(decode)?,
                    event_type: row.try_get("event_type").map_err(decode)?,
                    category: parse_category(&category_str)?,
                    actor: row.try_get("actor").map_err(decode)?,
                    outcome: parse_outcome(&outcome_str)?,
                    metadata,
                    occurred_at: parse_timestamp(&occurred_at_str)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use fundflow_core::audit::{AuditCategory, AuditOutcome, RequestAuditEvent};
    use fundflow_core::domain::request::RequestId;

    use super::SqlAuditEventRepository;
    use crate::repositories::AuditEventRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn events_round_trip_with_metadata() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlAuditEventRepository::new(pool);

        let event = RequestAuditEvent::new(
            Some(RequestId("req-77".to_string())),
            "corr-9",
            "request.decision_applied",
            AuditCategory::Request,
            "approval-engine",
            AuditOutcome::Success,
        )
        .with_metadata("level", "2")
        .with_metadata("decision", "approve");

        repo.append(&event).await.expect("append");

        let events =
            repo.list_for_request(&RequestId("req-77".to_string())).await.expect("list");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "request.decision_applied");
        assert_eq!(events[0].metadata.get("level").map(String::as_str), Some("2"));
    }
}
