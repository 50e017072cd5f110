use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use fundflow_core::audit::RequestAuditEvent;
use fundflow_core::directory::OrgDirectory;
use fundflow_core::domain::approval::{Approval, ApprovalId, ApprovalStatus};
use fundflow_core::domain::delegation::Delegation;
use fundflow_core::domain::org::UserId;
use fundflow_core::domain::outbox::{EmailMessage, OutboundEmail};
use fundflow_core::domain::receiver::FinalReceiverAssignment;
use fundflow_core::domain::request::{FundRequest, RequestField, RequestId, RequestStatus};
use fundflow_core::domain::workflow::{Workflow, WorkflowFinalReceiver, WorkflowId};

pub mod approval;
pub mod audit;
pub mod delegation;
pub mod memory;
pub mod org;
pub mod outbox;
pub mod receiver;
pub mod request;
pub mod workflow;

pub use approval::SqlApprovalRepository;
pub use audit::SqlAuditEventRepository;
pub use delegation::SqlDelegationRepository;
pub use memory::{InMemoryAuditEventRepository, InMemoryOutboxRepository};
pub use org::SqlOrgRepository;
pub use outbox::SqlOutboxRepository;
pub use receiver::SqlFinalReceiverRepository;
pub use request::SqlFundRequestRepository;
pub use workflow::SqlWorkflowRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// A unique-constraint violation. The engine treats this on an approval
    /// insert as "someone else already advanced this level".
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Maps a unique-constraint violation to `Conflict`, everything else to
/// `Database`.
pub(crate) fn conflict_on_unique(error: sqlx::Error, context: &str) -> RepositoryError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(context.to_string())
        }
        _ => RepositoryError::Database(error),
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

pub(crate) fn parse_optional_timestamp(
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|value| parse_timestamp(&value)).transpose()
}

#[async_trait]
pub trait FundRequestRepository: Send + Sync {
    async fn insert(&self, request: &FundRequest) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<FundRequest>, RepositoryError>;
    async fn update_status(
        &self,
        id: &RequestId,
        status: RequestStatus,
        current_level: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn append_fields(
        &self,
        id: &RequestId,
        fields: &[(String, String)],
        revision: i32,
    ) -> Result<(), RepositoryError>;
    async fn list_fields(&self, id: &RequestId) -> Result<Vec<RequestField>, RepositoryError>;
    async fn next_field_revision(&self, id: &RequestId) -> Result<i32, RepositoryError>;
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// Plain insert so the partial unique index can fire; a violation
    /// surfaces as `RepositoryError::Conflict`.
    async fn insert_pending(&self, approval: &Approval) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<Approval>, RepositoryError>;
    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<Approval>, RepositoryError>;
    async fn list_pending_for_level(
        &self,
        id: &RequestId,
        level: i32,
    ) -> Result<Vec<Approval>, RepositoryError>;
    async fn record_decision(
        &self,
        id: &ApprovalId,
        status: ApprovalStatus,
        comment: Option<&str>,
        actioned_at: DateTime<Utc>,
        approved_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, RepositoryError>;
    async fn final_receiver_rows(
        &self,
        id: WorkflowId,
    ) -> Result<Vec<WorkflowFinalReceiver>, RepositoryError>;
}

#[async_trait]
pub trait DelegationRepository: Send + Sync {
    /// Every unrevoked delegation row; window filtering happens in the
    /// resolver against the injected clock.
    async fn list_unrevoked(&self) -> Result<Vec<Delegation>, RepositoryError>;
}

#[async_trait]
pub trait OrgRepository: Send + Sync {
    /// One directory snapshot per inbound action: users, designation names,
    /// project member emails, and current pending-approval counts.
    async fn load_directory(&self) -> Result<OrgDirectory, RepositoryError>;
}

/// Result of a final receiver acting on a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcknowledgeOutcome {
    /// This receiver completed the request; all other pending rows were
    /// auto-closed.
    Completed,
    /// Another receiver completed first, or this row was already closed.
    AlreadyClosed,
}

#[async_trait]
pub trait FinalReceiverRepository: Send + Sync {
    async fn insert_assignments(
        &self,
        assignments: &[FinalReceiverAssignment],
    ) -> Result<(), RepositoryError>;
    async fn list_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<FinalReceiverAssignment>, RepositoryError>;
    /// First pending acknowledger wins; the rest auto-close in the same
    /// unit of work.
    async fn acknowledge(
        &self,
        id: &RequestId,
        user: UserId,
        at: DateTime<Utc>,
    ) -> Result<AcknowledgeOutcome, RepositoryError>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn enqueue(
        &self,
        message: &OutboundEmail,
        queued_at: DateTime<Utc>,
    ) -> Result<EmailMessage, RepositoryError>;
    /// Oldest queued messages, bounded by `limit`.
    async fn claim_batch(&self, limit: u32) -> Result<Vec<EmailMessage>, RepositoryError>;
    async fn mark_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<(), RepositoryError>;
    /// Records a delivery failure; the message fails permanently once
    /// `max_attempts` is reached, otherwise it returns to the queue.
    async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: &RequestAuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<RequestAuditEvent>, RepositoryError>;
}
