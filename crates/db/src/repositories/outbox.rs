use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use fundflow_core::domain::outbox::{EmailMessage, OutboundEmail, OutboxState};

use super::{parse_optional_timestamp, parse_timestamp, OutboxRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOutboxRepository {
    pool: DbPool,
}

impl SqlOutboxRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn count_in_state(&self, state: OutboxState) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM email_outbox WHERE state = ?")
            .bind(outbox_state_as_str(state))
            .fetch_one(&self.pool)
            .await?;
        row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))
    }
}

pub fn outbox_state_as_str(state: OutboxState) -> &'static str {
    match state {
        OutboxState::Queued => "queued",
        OutboxState::Sent => "sent",
        OutboxState::Failed => "failed",
    }
}

fn parse_state(raw: &str) -> Result<OutboxState, RepositoryError> {
    match raw {
        "queued" => Ok(OutboxState::Queued),
        "sent" => Ok(OutboxState::Sent),
        "failed" => Ok(OutboxState::Failed),
        other => Err(RepositoryError::Decode(format!("unknown outbox state `{other}`"))),
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<EmailMessage, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let state_str: String = row.try_get("state").map_err(decode)?;
    let attempts: i64 = row.try_get("attempts").map_err(decode)?;
    let queued_at_str: String = row.try_get("queued_at").map_err(decode)?;
    let sent_at_str: Option<String> = row.try_get("sent_at").map_err(decode)?;

    Ok(EmailMessage {
        id: row.try_get("id").map_err(decode)?,
        to_address: row.try_get("to_address").map_err(decode)?,
        cc_address: row.try_get("cc_address").map_err(decode)?,
        subject: row.try_get("subject").map_err(decode)?,
        html_body: row.try_get("html_body").map_err(decode)?,
        state: parse_state(&state_str)?,
        attempts: attempts.max(0) as u32,
        last_error: row.try_get("last_error").map_err(decode)?,
        queued_at: parse_timestamp(&queued_at_str)?,
        sent_at: parse_optional_timestamp(sent_at_str)?,
    })
}

#[async_trait::async_trait]
impl OutboxRepository for SqlOutboxRepository {
    async fn enqueue(
        &self,
        message: &OutboundEmail,
        queued_at: DateTime<Utc>,
    ) -> Result<EmailMessage, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO email_outbox (id, to_address, cc_address, subject, html_body,
                                       state, attempts, last_error, queued_at, sent_at)
             VALUES (?, ?, ?, ?, ?, 'queued', 0, NULL, ?, NULL)",
        )
        .bind(&id)
        .bind(&message.to_address)
        .bind(&message.cc_address)
        .bind(&message.subject)
        .bind(&message.html_body)
        .bind(queued_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(EmailMessage {
            id,
            to_address: message.to_address.clone(),
            cc_address: message.cc_address.clone(),
            subject: message.subject.clone(),
            html_body: message.html_body.clone(),
            state: OutboxState::Queued,
            attempts: 0,
            last_error: None,
            queued_at,
            sent_at: None,
        })
    }

    async fn claim_batch(&self, limit: u32) -> Result<Vec<EmailMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, to_address, cc_address, subject, html_body, state,
                    attempts, last_error, queued_at, sent_at
             FROM email_outbox WHERE state = 'queued'
             ORDER BY queued_at ASC, id ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn mark_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE email_outbox
             SET state = 'sent', attempts = attempts + 1, last_error = NULL, sent_at = ?
             WHERE id = ?",
        )
        .bind(sent_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE email_outbox
             SET attempts = attempts + 1,
                 last_error = ?,
                 state = CASE WHEN attempts + 1 >= ? THEN 'failed' ELSE 'queued' END
             WHERE id = ?",
        )
        .bind(error)
        .bind(max_attempts)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
