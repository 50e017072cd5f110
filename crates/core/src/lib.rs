pub mod audit;
pub mod clock;
pub mod config;
pub mod delegation;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod notify;
pub mod receivers;
pub mod routing;

pub use audit::{AuditCategory, AuditOutcome, RequestAuditEvent};
pub use clock::{Clock, FixedClock, SystemClock};
pub use delegation::DelegationResolver;
pub use directory::OrgDirectory;
pub use domain::approval::{Approval, ApprovalId, ApprovalStatus};
pub use domain::delegation::{Delegation, DelegationId};
pub use domain::org::{
    DepartmentId, Designation, DesignationId, ProjectId, ProjectMember, UserId, UserProfile,
};
pub use domain::outbox::{EmailMessage, OutboundEmail, OutboxState};
pub use domain::receiver::{FinalReceiverAssignment, ReceiverStatus};
pub use domain::request::{FundRequest, NewFundRequest, RequestField, RequestId, RequestStatus};
pub use domain::workflow::{StepId, Workflow, WorkflowFinalReceiver, WorkflowId, WorkflowStep};
pub use errors::DomainError;
pub use lifecycle::{ApprovalDecision, EngineAction, TransitionError, TransitionOutcome};
pub use notify::{Notifications, NotifyError};
pub use receivers::final_receivers;
pub use routing::{ApproverResolver, RoutingError, RoutingOptions, StepAssignment};

// Re-exported so downstream crates agree on one chrono.
pub use chrono;
