use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::org::{DepartmentId, ProjectId, UserId};
use crate::domain::workflow::WorkflowId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    SentBack,
}

impl RequestStatus {
    /// Terminal statuses accept no further decisions. `SentBack` is not
    /// terminal: the initiator may resubmit.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FundRequest {
    pub id: RequestId,
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub initiator_id: UserId,
    pub workflow_id: WorkflowId,
    pub department_id: Option<DepartmentId>,
    pub project_id: Option<ProjectId>,
    pub status: RequestStatus,
    pub current_level: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Free-form key/value form data attached to a request. Resubmission after a
/// send-back appends a new revision instead of rewriting prior values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestField {
    pub request_id: RequestId,
    pub name: String,
    pub value: String,
    pub revision: i32,
}

/// Submission payload, validated before any row is written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewFundRequest {
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub initiator_id: UserId,
    pub workflow_id: WorkflowId,
    pub department_id: Option<DepartmentId>,
    pub project_id: Option<ProjectId>,
    pub fields: Vec<(String, String)>,
}

impl NewFundRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::NonPositiveAmount { amount: self.amount });
        }
        if self.title.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "request title must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}
