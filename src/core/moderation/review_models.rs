// Moderation review models.

use crate::core::events::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// Permission needed to look at firewall events.
pub const READ_FIREWALL: &str = "read:firewall";
/// Permission needed to resolve firewall events.
pub const REVIEW_FIREWALL: &str = "review:firewall";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    /// Keep the block and make it permanent
    Confirm,
    /// Lift the block and restore the prior state
    Undo,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::Confirm => "confirm",
            ReviewAction::Undo => "undo",
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub firewall_event_id: Uuid,
    pub action: ReviewAction,
    pub reviewer_id: Uuid,
    pub reviewer_ip: IpAddr,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    /// The moderation event resolving the firewall event
    pub event: Event,
    /// True when the same review had already been applied and nothing was written
    pub replayed: bool,
}
