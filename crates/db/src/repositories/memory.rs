use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use fundflow_core::audit::RequestAuditEvent;
use fundflow_core::domain::outbox::{EmailMessage, OutboundEmail, OutboxState};
use fundflow_core::domain::request::RequestId;

use super::{AuditEventRepository, OutboxRepository, RepositoryError};

/// Outbox kept in memory, for drainer tests and development without a
/// database file.
#[derive(Default)]
pub struct InMemoryOutboxRepository {
    messages: RwLock<HashMap<String, EmailMessage>>,
}

impl InMemoryOutboxRepository {
    pub async fn all(&self) -> Vec<EmailMessage> {
        let messages = self.messages.read().await;
        let mut all: Vec<EmailMessage> = messages.values().cloned().collect();
        all.sort_by(|left, right| left.queued_at.cmp(&right.queued_at).then(left.id.cmp(&right.id)));
        all
    }
}

#[async_trait::async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn enqueue(
        &self,
        message: &OutboundEmail,
        queued_at: DateTime<Utc>,
    ) -> Result<EmailMessage, RepositoryError> {
        let stored = EmailMessage {
            id: Uuid::new_v4().to_string(),
            to_address: message.to_address.clone(),
            cc_address: message.cc_address.clone(),
            subject: message.subject.clone(),
            html_body: message.html_body.clone(),
            state: OutboxState::Queued,
            attempts: 0,
            last_error: None,
            queued_at,
            sent_at: None,
        };

        let mut messages = self.messages.write().await;
        messages.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn claim_batch(&self, limit: u32) -> Result<Vec<EmailMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut queued: Vec<EmailMessage> =
            messages.values().filter(|m| m.state == OutboxState::Queued).cloned().collect();
        queued.sort_by(|left, right| {
            left.queued_at.cmp(&right.queued_at).then(left.id.cmp(&right.id))
        });
        queued.truncate(limit as usize);
        Ok(queued)
    }

    async fn mark_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        if let Some(message) = messages.get_mut(id) {
            message.state = OutboxState::Sent;
            message.attempts += 1;
            message.last_error = None;
            message.sent_at = Some(sent_at);
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        if let Some(message) = messages.get_mut(id) {
            message.attempts += 1;
            message.last_error = Some(error.to_string());
            message.state =
                if message.attempts >= max_attempts { OutboxState::Failed } else { OutboxState::Queued };
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAuditEventRepository {
    events: RwLock<Vec<RequestAuditEvent>>,
}

impl InMemoryAuditEventRepository {
    pub async fn all(&self) -> Vec<RequestAuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait::async_trait]
impl AuditEventRepository for InMemoryAuditEventRepository {
    async fn append(&self, event: &RequestAuditEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(())
    }

    async fn list_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<RequestAuditEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| event.request_id.as_ref() == Some(id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use fundflow_core::domain::outbox::{OutboundEmail, OutboxState};

    use super::InMemoryOutboxRepository;
    use crate::repositories::OutboxRepository;

    fn message(to: &str) -> OutboundEmail {
        OutboundEmail {
            to_address: to.to_string(),
            cc_address: None,
            subject: "subject".to_string(),
            html_body: "<html></html>".to_string(),
        }
    }

    #[tokio::test]
    async fn in_memory_outbox_mirrors_the_sql_retry_contract() {
        let repo = InMemoryOutboxRepository::default();
        let queued = repo.enqueue(&message("a@example.com"), Utc::now()).await.expect("enqueue");

        repo.mark_failed(&queued.id, "timeout", 2).await.expect("fail once");
        assert_eq!(repo.claim_batch(10).await.expect("claim").len(), 1);

        repo.mark_failed(&queued.id, "timeout", 2).await.expect("fail twice");
        assert!(repo.claim_batch(10).await.expect("claim").is_empty());
        assert_eq!(repo.all().await[0].state, OutboxState::Failed);
    }
}
