use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::org::UserId;
use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    SentBack,
    FinalReceiver,
}

/// One row per (request, level, approver).
///
/// At most one `Pending` row may exist per (request, level, approver); the
/// storage layer enforces this with a partial unique index and the engine
/// treats a violation on insert as "someone else already advanced".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub request_id: RequestId,
    pub level: i32,
    pub approver_id: UserId,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    /// Set when the duty was manually reassigned away from the resolved
    /// approver.
    pub overridden_user_id: Option<UserId>,
    pub assigned_at: DateTime<Utc>,
    pub actioned_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Approval {
    /// The user currently responsible for acting on this row.
    pub fn acting_user(&self) -> UserId {
        self.overridden_user_id.unwrap_or(self.approver_id)
    }
}
