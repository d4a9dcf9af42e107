// In-process outbox mailer.
//
// Used when no SMTP relay is configured: every message is logged and kept in
// memory, keyed by recipient, so operators and tests can see what would have
// been sent.

use crate::core::notifications::{EmailMessage, Mailer, NotifyError};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct OutboxMailer {
    /// Maps recipient address -> messages, oldest first
    outbox: DashMap<String, Vec<EmailMessage>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self {
            outbox: DashMap::new(),
        }
    }

    /// Messages queued for one recipient.
    pub fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
        self.outbox
            .get(address)
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.outbox.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Email queued in outbox"
        );
        self.outbox
            .entry(message.to.clone())
            .or_default()
            .push(message);
        Ok(())
    }
}
