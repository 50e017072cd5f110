pub mod engine;
pub mod outbox;

pub use engine::{ApprovalEngine, EngineDeps, EngineError};
pub use outbox::{
    DrainStats, DrainerSettings, MailTransport, NoopMailTransport, OutboxDrainer,
    RecordingMailTransport, TransportError,
};
