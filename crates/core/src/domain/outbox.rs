use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxState {
    Queued,
    Sent,
    Failed,
}

/// A durable not-yet-sent email row. The engine only ever appends; a
/// separate drainer claims bounded batches and performs delivery, recording
/// attempts and the last transport error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub to_address: String,
    pub cc_address: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub state: OutboxState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A message the notification layer wants enqueued. Becomes an
/// `EmailMessage` once the outbox assigns an id and timestamps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to_address: String,
    pub cc_address: Option<String>,
    pub subject: String,
    pub html_body: String,
}
