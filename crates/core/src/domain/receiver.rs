use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::org::UserId;
use crate::domain::request::RequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiverStatus {
    Pending,
    Completed,
    AutoClosed,
}

/// Per-request terminal-receiver row. The first receiver to acknowledge
/// completes; every other pending row is auto-closed in the same unit of
/// work, so exactly one row per request ends up `Completed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReceiverAssignment {
    pub id: String,
    pub request_id: RequestId,
    pub user_id: UserId,
    pub status: ReceiverStatus,
    pub assigned_at: DateTime<Utc>,
    pub actioned_at: Option<DateTime<Utc>>,
}
