// Notification domain models.

use crate::core::firewall::FirewallRule;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Delivery error: {0}")]
    DeliveryError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

/// An outgoing email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text_body: String,
}

/// One blocked item as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeItem {
    pub id: Uuid,
    pub title: Option<String>,
}

/// Everything one affected owner is told about one firewall block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallNotice {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub rule: FirewallRule,
    pub event_id: Uuid,
    /// Only this owner's items
    pub items: Vec<NoticeItem>,
}

/// Outcome of notifying the owners affected by one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}
