use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use fundflow_core::clock::Clock;
use fundflow_core::domain::outbox::EmailMessage;
use fundflow_db::repositories::{OutboxRepository, RepositoryError};

#[derive(Debug, Error)]
#[error("mail transport failed: {0}")]
pub struct TransportError(pub String);

/// Delivery seam for the drainer. The engine never touches this; only the
/// worker process drives delivery.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError>;
}

/// Logs instead of sending. Default transport when no SMTP host is
/// configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMailTransport;

#[async_trait]
impl MailTransport for NoopMailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        tracing::info!(
            message_id = %message.id,
            to = %message.to_address,
            subject = %message.subject,
            "noop transport dropping message"
        );
        Ok(())
    }
}

/// Records deliveries in memory; addresses registered as failing error out.
#[derive(Default)]
pub struct RecordingMailTransport {
    sent: Mutex<Vec<EmailMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingMailTransport {
    pub fn fail_address(&self, address: &str) {
        match self.failing.lock() {
            Ok(mut failing) => {
                failing.insert(address.to_string());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(address.to_string());
            }
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl MailTransport for RecordingMailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        let failing = match self.failing.lock() {
            Ok(failing) => failing.contains(&message.to_address),
            Err(poisoned) => poisoned.into_inner().contains(&message.to_address),
        };
        if failing {
            return Err(TransportError(format!("delivery refused for {}", message.to_address)));
        }

        match self.sent.lock() {
            Ok(mut sent) => sent.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DrainerSettings {
    pub interval_secs: u64,
    pub batch_size: u32,
    pub max_attempts: u32,
}

impl Default for DrainerSettings {
    fn default() -> Self {
        Self { interval_secs: 5, batch_size: 25, max_attempts: 5 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Claims bounded batches of queued messages and pushes them through the
/// transport, independently of the request path.
pub struct OutboxDrainer {
    outbox: Arc<dyn OutboxRepository>,
    transport: Arc<dyn MailTransport>,
    settings: DrainerSettings,
    clock: Arc<dyn Clock>,
}

impl OutboxDrainer {
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        transport: Arc<dyn MailTransport>,
        settings: DrainerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { outbox, transport, settings, clock }
    }

    pub async fn drain_once(&self) -> Result<DrainStats, RepositoryError> {
        let batch = self.outbox.claim_batch(self.settings.batch_size).await?;
        let mut stats = DrainStats { claimed: batch.len(), ..DrainStats::default() };

        for message in &batch {
            match self.transport.send(message).await {
                Ok(()) => {
                    self.outbox.mark_sent(&message.id, self.clock.now()).await?;
                    stats.sent += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        message_id = %message.id,
                        to = %message.to_address,
                        attempts = message.attempts + 1,
                        error = %error,
                        "outbox delivery failed"
                    );
                    self.outbox
                        .mark_failed(&message.id, &error.to_string(), self.settings.max_attempts)
                        .await?;
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Runs until the shutdown channel flips. Errors are logged and the
    /// loop keeps going; a broken database beat is retried next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.settings.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.drain_once().await {
                        Ok(stats) if stats.claimed > 0 => {
                            tracing::debug!(
                                claimed = stats.claimed,
                                sent = stats.sent,
                                failed = stats.failed,
                                "outbox drain pass complete"
                            );
                        }
                        Ok(_) => {}
                        Err(error) => {
                            tracing::warn!(error = %error, "outbox drain pass failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
