use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::ApprovalStatus;
use crate::domain::request::RequestStatus;

/// Action an approver takes on a pending approval row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Approve,
    Reject,
    SendBack,
}

/// Follow-up work a transition demands of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineAction {
    /// Resolve and assign the next level's approver.
    AssignNextLevel,
    /// Compute final receivers, create their assignment rows, fan out
    /// completion notifications.
    FanOutFinalReceivers,
    NotifyStepApproved,
    NotifyRejected,
    NotifySentBack,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub approval_status: ApprovalStatus,
    pub request_status: RequestStatus,
    pub actions: Vec<EngineAction>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("approval is already resolved as {status:?}")]
    ApprovalAlreadyResolved { status: ApprovalStatus },
    #[error("request is {status:?} and accepts no further decisions")]
    RequestClosed { status: RequestStatus },
    #[error("request is {status:?}; only a sent-back request can be resubmitted")]
    NotSentBack { status: RequestStatus },
}

/// Applies a decision to one approval level. Validity is checked here,
/// centrally, rather than at each call site.
pub fn decide(
    request_status: RequestStatus,
    approval_status: ApprovalStatus,
    decision: ApprovalDecision,
    is_last_level: bool,
) -> Result<TransitionOutcome, TransitionError> {
    if request_status != RequestStatus::Pending {
        return Err(TransitionError::RequestClosed { status: request_status });
    }
    if approval_status != ApprovalStatus::Pending {
        return Err(TransitionError::ApprovalAlreadyResolved { status: approval_status });
    }

    let outcome = match decision {
        ApprovalDecision::Approve if is_last_level => TransitionOutcome {
            approval_status: ApprovalStatus::Approved,
            request_status: RequestStatus::Approved,
            actions: vec![EngineAction::FanOutFinalReceivers],
        },
        ApprovalDecision::Approve => TransitionOutcome {
            approval_status: ApprovalStatus::Approved,
            request_status: RequestStatus::Pending,
            actions: vec![EngineAction::AssignNextLevel, EngineAction::NotifyStepApproved],
        },
        ApprovalDecision::Reject => TransitionOutcome {
            approval_status: ApprovalStatus::Rejected,
            request_status: RequestStatus::Rejected,
            actions: vec![EngineAction::NotifyRejected],
        },
        ApprovalDecision::SendBack => TransitionOutcome {
            approval_status: ApprovalStatus::SentBack,
            request_status: RequestStatus::SentBack,
            actions: vec![EngineAction::NotifySentBack],
        },
    };
    Ok(outcome)
}

/// Resubmission re-enters the chain at level 0; the prior approval history
/// is kept, a fresh chain is appended.
pub fn resubmit(request_status: RequestStatus) -> Result<RequestStatus, TransitionError> {
    match request_status {
        RequestStatus::SentBack => Ok(RequestStatus::Pending),
        other => Err(TransitionError::NotSentBack { status: other }),
    }
}
