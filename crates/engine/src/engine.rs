use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use fundflow_core::audit::{AuditCategory, AuditOutcome, RequestAuditEvent};
use fundflow_core::clock::{Clock, SystemClock};
use fundflow_core::delegation::DelegationResolver;
use fundflow_core::domain::approval::{Approval, ApprovalId, ApprovalStatus};
use fundflow_core::domain::org::UserId;
use fundflow_core::domain::outbox::OutboundEmail;
use fundflow_core::domain::receiver::{FinalReceiverAssignment, ReceiverStatus};
use fundflow_core::domain::request::{FundRequest, NewFundRequest, RequestId, RequestStatus};
use fundflow_core::domain::workflow::{Workflow, WorkflowId};
use fundflow_core::errors::DomainError;
use fundflow_core::lifecycle::{self, ApprovalDecision, EngineAction, TransitionOutcome};
use fundflow_core::notify::{Notifications, NotifyError};
use fundflow_core::receivers::final_receivers;
use fundflow_core::routing::{ApproverResolver, RoutingError, RoutingOptions};

use fundflow_db::repositories::{
    AcknowledgeOutcome, ApprovalRepository, AuditEventRepository, DelegationRepository,
    FinalReceiverRepository, FundRequestRepository, OrgRepository, OutboxRepository,
    RepositoryError, SqlApprovalRepository, SqlAuditEventRepository, SqlDelegationRepository,
    SqlFinalReceiverRepository, SqlFundRequestRepository, SqlOrgRepository, SqlOutboxRepository,
    SqlWorkflowRepository, WorkflowRepository,
};
use fundflow_db::DbPool;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error("fund request `{0}` not found")]
    RequestNotFound(String),
    #[error("approval `{0}` not found")]
    ApprovalNotFound(String),
    #[error("workflow {0} not found")]
    WorkflowNotFound(i64),
    #[error("workflow {0} has no steps")]
    EmptyWorkflow(i64),
    #[error("user {actor} is not the assigned approver for approval `{approval}`")]
    NotAssignedApprover { actor: i64, approval: String },
}

/// Repository handles the engine works through; any mix of SQL and
/// in-memory implementations.
pub struct EngineDeps {
    pub requests: Arc<dyn FundRequestRepository>,
    pub approvals: Arc<dyn ApprovalRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub delegations: Arc<dyn DelegationRepository>,
    pub org: Arc<dyn OrgRepository>,
    pub receivers: Arc<dyn FinalReceiverRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
    pub audit: Arc<dyn AuditEventRepository>,
}

impl EngineDeps {
    pub fn from_pool(pool: DbPool) -> Self {
        Self {
            requests: Arc::new(SqlFundRequestRepository::new(pool.clone())),
            approvals: Arc::new(SqlApprovalRepository::new(pool.clone())),
            workflows: Arc::new(SqlWorkflowRepository::new(pool.clone())),
            delegations: Arc::new(SqlDelegationRepository::new(pool.clone())),
            org: Arc::new(SqlOrgRepository::new(pool.clone())),
            receivers: Arc::new(SqlFinalReceiverRepository::new(pool.clone())),
            outbox: Arc::new(SqlOutboxRepository::new(pool.clone())),
            audit: Arc::new(SqlAuditEventRepository::new(pool)),
        }
    }
}

/// One engine instance per process; every operation is a single logical
/// unit of work over the injected repositories.
pub struct ApprovalEngine {
    deps: EngineDeps,
    notifications: Notifications,
    options: RoutingOptions,
    clock: Arc<dyn Clock>,
}

impl ApprovalEngine {
    pub fn new(
        deps: EngineDeps,
        options: RoutingOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        Ok(Self { deps, notifications: Notifications::new()?, options, clock })
    }

    pub fn with_pool(pool: DbPool, options: RoutingOptions) -> Result<Self, EngineError> {
        Self::new(EngineDeps::from_pool(pool), options, Arc::new(SystemClock))
    }

    /// Creates the request and assigns its level-0 approval.
    pub async fn submit(
        &self,
        submission: NewFundRequest,
        correlation_id: &str,
    ) -> Result<FundRequest, EngineError> {
        submission.validate()?;

        let workflow = self.load_workflow(submission.workflow_id.0).await?;
        let now = self.clock.now();
        let request = FundRequest {
            id: RequestId(Uuid::new_v4().to_string()),
            title: submission.title.clone(),
            description: submission.description.clone(),
            amount: submission.amount,
            initiator_id: submission.initiator_id,
            workflow_id: submission.workflow_id,
            department_id: submission.department_id,
            project_id: submission.project_id,
            status: RequestStatus::Pending,
            current_level: 0,
            created_at: now,
            updated_at: now,
        };

        self.deps.requests.insert(&request).await?;
        if !submission.fields.is_empty() {
            self.deps.requests.append_fields(&request.id, &submission.fields, 0).await?;
        }

        self.append_audit(
            RequestAuditEvent::new(
                Some(request.id.clone()),
                correlation_id,
                "request.submitted",
                AuditCategory::Request,
                actor_label(request.initiator_id),
                AuditOutcome::Success,
            )
            .with_metadata("workflow_id", request.workflow_id.0.to_string())
            .with_metadata("amount", request.amount.to_string()),
        )
        .await;

        self.assign_levels_from(&request, &workflow, 0, false, correlation_id).await?;

        self.deps
            .requests
            .find_by_id(&request.id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request.id.0.clone()))
    }

    /// Applies an approver's decision to a pending approval and performs
    /// whatever follow-up the transition demands.
    pub async fn decide(
        &self,
        approval_id: &ApprovalId,
        actor: UserId,
        decision: ApprovalDecision,
        comment: Option<&str>,
        correlation_id: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        let approval = self
            .deps
            .approvals
            .find_by_id(approval_id)
            .await?
            .ok_or_else(|| EngineError::ApprovalNotFound(approval_id.0.clone()))?;
        let request = self
            .deps
            .requests
            .find_by_id(&approval.request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(approval.request_id.0.clone()))?;
        let workflow = self.load_workflow(request.workflow_id.0).await?;

        if approval.acting_user() != actor {
            return Err(EngineError::NotAssignedApprover {
                actor: actor.0,
                approval: approval_id.0.clone(),
            });
        }

        let outcome = lifecycle::decide(
            request.status,
            approval.status,
            decision,
            workflow.is_last_level(approval.level),
        )
        .map_err(DomainError::from)?;

        let now = self.clock.now();
        let approved_at =
            (outcome.approval_status == ApprovalStatus::Approved).then_some(now);
        self.deps
            .approvals
            .record_decision(approval_id, outcome.approval_status, comment, now, approved_at)
            .await?;

        self.append_audit(
            RequestAuditEvent::new(
                Some(request.id.clone()),
                correlation_id,
                "request.decision_applied",
                AuditCategory::Request,
                actor_label(actor),
                AuditOutcome::Success,
            )
            .with_metadata("level", approval.level.to_string())
            .with_metadata("decision", format!("{decision:?}")),
        )
        .await;

        for action in &outcome.actions {
            match action {
                EngineAction::AssignNextLevel => {
                    let next_level = approval.level + 1;
                    self.deps
                        .requests
                        .update_status(&request.id, RequestStatus::Pending, next_level, now)
                        .await?;
                    self.assign_levels_from(&request, &workflow, next_level, true, correlation_id)
                        .await?;
                }
                EngineAction::FanOutFinalReceivers => {
                    self.complete_request(&request, &workflow, correlation_id).await?;
                }
                EngineAction::NotifyStepApproved => {
                    // Covered by the next-level assignment path above.
                }
                EngineAction::NotifyRejected => {
                    self.deps
                        .requests
                        .update_status(&request.id, RequestStatus::Rejected, approval.level, now)
                        .await?;
                    let directory = self.deps.org.load_directory().await?;
                    if let Some(initiator) = directory.user(request.initiator_id) {
                        let built =
                            self.notifications.request_rejected(&request, initiator, comment);
                        self.enqueue_all(built, &request, correlation_id).await?;
                    }
                }
                EngineAction::NotifySentBack => {
                    self.deps
                        .requests
                        .update_status(&request.id, RequestStatus::SentBack, approval.level, now)
                        .await?;
                    let directory = self.deps.org.load_directory().await?;
                    if let Some(initiator) = directory.user(request.initiator_id) {
                        let built =
                            self.notifications.request_sent_back(&request, initiator, comment);
                        self.enqueue_all(built, &request, correlation_id).await?;
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Re-enters a sent-back request at level 0 with a fresh approval chain
    /// and a new field revision; prior history stays untouched.
    pub async fn resubmit(
        &self,
        request_id: &RequestId,
        fields: &[(String, String)],
        correlation_id: &str,
    ) -> Result<FundRequest, EngineError> {
        let request = self
            .deps
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.0.clone()))?;
        let workflow = self.load_workflow(request.workflow_id.0).await?;

        let next_status = lifecycle::resubmit(request.status).map_err(DomainError::from)?;
        let now = self.clock.now();
        self.deps.requests.update_status(request_id, next_status, 0, now).await?;

        if !fields.is_empty() {
            let revision = self.deps.requests.next_field_revision(request_id).await?;
            self.deps.requests.append_fields(request_id, fields, revision).await?;
        }

        self.append_audit(
            RequestAuditEvent::new(
                Some(request.id.clone()),
                correlation_id,
                "request.resubmitted",
                AuditCategory::Request,
                actor_label(request.initiator_id),
                AuditOutcome::Success,
            ),
        )
        .await;

        let mut reopened = request;
        reopened.status = next_status;
        reopened.current_level = 0;
        self.assign_levels_from(&reopened, &workflow, 0, false, correlation_id).await?;

        self.deps
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.0.clone()))
    }

    /// A final receiver acknowledges a completed request. First one wins;
    /// the rest are auto-closed, and acting late is a benign no-op.
    pub async fn acknowledge(
        &self,
        request_id: &RequestId,
        user: UserId,
        correlation_id: &str,
    ) -> Result<AcknowledgeOutcome, EngineError> {
        let outcome =
            self.deps.receivers.acknowledge(request_id, user, self.clock.now()).await?;

        self.append_audit(
            RequestAuditEvent::new(
                Some(request_id.clone()),
                correlation_id,
                "receiver.acknowledged",
                AuditCategory::Receiver,
                actor_label(user),
                match outcome {
                    AcknowledgeOutcome::Completed => AuditOutcome::Success,
                    AcknowledgeOutcome::AlreadyClosed => AuditOutcome::Rejected,
                },
            ),
        )
        .await;

        Ok(outcome)
    }

    /// Assigns the approval at `start_level`, cascading through any
    /// auto-approve steps. A unique-constraint conflict on the insert means
    /// another actor already advanced this level, and the engine backs off.
    async fn assign_levels_from(
        &self,
        request: &FundRequest,
        workflow: &Workflow,
        start_level: i32,
        progressing: bool,
        correlation_id: &str,
    ) -> Result<(), EngineError> {
        let mut level = start_level;

        while let Some(step) = workflow.step_at(level) {
            let directory = self.deps.org.load_directory().await?;
            let resolver = ApproverResolver::new(&directory, self.options);
            let assignment =
                resolver.resolve(step, request.initiator_id, request.project_id, request.department_id)?;

            let now = self.clock.now();
            let delegations = self.deps.delegations.list_unrevoked().await?;
            let effective =
                DelegationResolver::new(delegations).resolve(assignment.approver_id, now);

            let approval = Approval {
                id: ApprovalId(Uuid::new_v4().to_string()),
                request_id: request.id.clone(),
                level,
                approver_id: effective,
                status: ApprovalStatus::Pending,
                comment: None,
                overridden_user_id: None,
                assigned_at: now,
                actioned_at: None,
                approved_at: None,
            };

            match self.deps.approvals.insert_pending(&approval).await {
                Ok(()) => {}
                Err(RepositoryError::Conflict(context)) => {
                    tracing::warn!(
                        request_id = %request.id.0,
                        level,
                        context = %context,
                        "approval already assigned, absorbing concurrent advance"
                    );
                    return Ok(());
                }
                Err(other) => return Err(other.into()),
            }

            self.deps
                .requests
                .update_status(&request.id, RequestStatus::Pending, level, now)
                .await?;

            let mut audit = RequestAuditEvent::new(
                Some(request.id.clone()),
                correlation_id,
                "routing.approver_assigned",
                AuditCategory::Routing,
                "approval-engine",
                AuditOutcome::Success,
            )
            .with_metadata("level", level.to_string())
            .with_metadata("approver_id", effective.0.to_string());
            if effective != assignment.approver_id {
                audit = audit
                    .with_metadata("delegated_from", assignment.approver_id.0.to_string());
            }
            self.append_audit(audit).await;

            if step.auto_approve {
                self.deps
                    .approvals
                    .record_decision(&approval.id, ApprovalStatus::Approved, None, now, Some(now))
                    .await?;
                if workflow.is_last_level(level) {
                    return self.complete_request(request, workflow, correlation_id).await;
                }
                level += 1;
                continue;
            }

            let mut request_view = request.clone();
            request_view.current_level = level;
            let initiator = directory.user(request.initiator_id).cloned();
            let approver = directory.user(effective).cloned();
            if let (Some(initiator), Some(approver)) = (initiator, approver) {
                let built = if progressing {
                    self.notifications.step_approved(&request_view, &initiator, &approver)
                } else {
                    self.notifications.request_initiated(&request_view, &initiator, &approver)
                };
                self.enqueue_all(built, request, correlation_id).await?;
            }

            return Ok(());
        }

        Ok(())
    }

    /// Terminal approval: compute the completion audience, create their
    /// assignment rows, fan out one message per usable address.
    async fn complete_request(
        &self,
        request: &FundRequest,
        workflow: &Workflow,
        correlation_id: &str,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        self.deps
            .requests
            .update_status(&request.id, RequestStatus::Approved, workflow.last_level(), now)
            .await?;

        let directory = self.deps.org.load_directory().await?;
        let legacy = self.deps.workflows.final_receiver_rows(workflow.id).await?;
        let receivers = final_receivers(
            &directory,
            workflow,
            &legacy,
            request.project_id,
            request.department_id,
        );

        let assignments: Vec<FinalReceiverAssignment> = receivers
            .iter()
            .map(|receiver| FinalReceiverAssignment {
                id: Uuid::new_v4().to_string(),
                request_id: request.id.clone(),
                user_id: receiver.id,
                status: ReceiverStatus::Pending,
                assigned_at: now,
                actioned_at: None,
            })
            .collect();
        self.deps.receivers.insert_assignments(&assignments).await?;

        self.append_audit(
            RequestAuditEvent::new(
                Some(request.id.clone()),
                correlation_id,
                "receiver.fanned_out",
                AuditCategory::Receiver,
                "approval-engine",
                AuditOutcome::Success,
            )
            .with_metadata("receiver_count", receivers.len().to_string()),
        )
        .await;

        if let Some(initiator) = directory.user(request.initiator_id) {
            let built = self.notifications.request_completed(request, initiator, &receivers);
            self.enqueue_all(built, request, correlation_id).await?;
        }

        Ok(())
    }

    /// Best-effort enqueue: a failed template render is logged and skipped,
    /// never surfaced to the approver's action.
    async fn enqueue_all(
        &self,
        built: Result<Vec<OutboundEmail>, NotifyError>,
        request: &FundRequest,
        correlation_id: &str,
    ) -> Result<(), EngineError> {
        let messages = match built {
            Ok(messages) => messages,
            Err(error) => {
                tracing::warn!(
                    request_id = %request.id.0,
                    error = %error,
                    "notification build failed, skipping fan-out"
                );
                return Ok(());
            }
        };
        if messages.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let count = messages.len();
        for message in &messages {
            self.deps.outbox.enqueue(message, now).await?;
        }

        self.append_audit(
            RequestAuditEvent::new(
                Some(request.id.clone()),
                correlation_id,
                "notification.enqueued",
                AuditCategory::Notification,
                "approval-engine",
                AuditOutcome::Success,
            )
            .with_metadata("message_count", count.to_string()),
        )
        .await;

        Ok(())
    }

    async fn load_workflow(&self, id: i64) -> Result<Workflow, EngineError> {
        let workflow = self
            .deps
            .workflows
            .find_by_id(WorkflowId(id))
            .await?
            .ok_or(EngineError::WorkflowNotFound(id))?;
        if workflow.steps.is_empty() {
            return Err(EngineError::EmptyWorkflow(id));
        }
        Ok(workflow)
    }

    /// Audit is diagnostic; a failed append must not fail the action.
    async fn append_audit(&self, event: RequestAuditEvent) {
        if let Err(error) = self.deps.audit.append(&event).await {
            tracing::warn!(event_type = %event.event_type, error = %error, "audit append failed");
        }
    }
}

fn actor_label(user: UserId) -> String {
    format!("user:{}", user.0)
}
