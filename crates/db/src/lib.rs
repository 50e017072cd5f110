pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoSeed, SeedVerification};
pub use repositories::{
    AcknowledgeOutcome, ApprovalRepository, AuditEventRepository, DelegationRepository,
    FinalReceiverRepository, FundRequestRepository, OrgRepository, OutboxRepository,
    RepositoryError, WorkflowRepository,
};
