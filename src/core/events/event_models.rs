// Event ledger domain models.
//
// Events are append-only. Every state change made by the firewall or by a
// moderator becomes official only once an event naming it exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::firewall::FirewallRule;
use crate::core::moderation::ReviewAction;

/// Every event type the ledger knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "create:user")]
    CreateUser,
    #[serde(rename = "create:content:text_root")]
    CreateContentTextRoot,
    #[serde(rename = "create:content:text_child")]
    CreateContentTextChild,
    #[serde(rename = "update:content:points")]
    UpdateContentPoints,
    #[serde(rename = "firewall:block_users")]
    FirewallBlockUsers,
    #[serde(rename = "firewall:block_contents:text_root")]
    FirewallBlockContentsTextRoot,
    #[serde(rename = "firewall:block_contents:text_child")]
    FirewallBlockContentsTextChild,
    #[serde(rename = "moderation:block_users")]
    ModerationBlockUsers,
    #[serde(rename = "moderation:block_contents:text_root")]
    ModerationBlockContentsTextRoot,
    #[serde(rename = "moderation:block_contents:text_child")]
    ModerationBlockContentsTextChild,
    #[serde(rename = "moderation:unblock_users")]
    ModerationUnblockUsers,
    #[serde(rename = "moderation:unblock_contents:text_root")]
    ModerationUnblockContentsTextRoot,
    #[serde(rename = "moderation:unblock_contents:text_child")]
    ModerationUnblockContentsTextChild,
}

impl EventType {
    pub const ALL: [EventType; 13] = [
        EventType::CreateUser,
        EventType::CreateContentTextRoot,
        EventType::CreateContentTextChild,
        EventType::UpdateContentPoints,
        EventType::FirewallBlockUsers,
        EventType::FirewallBlockContentsTextRoot,
        EventType::FirewallBlockContentsTextChild,
        EventType::ModerationBlockUsers,
        EventType::ModerationBlockContentsTextRoot,
        EventType::ModerationBlockContentsTextChild,
        EventType::ModerationUnblockUsers,
        EventType::ModerationUnblockContentsTextRoot,
        EventType::ModerationUnblockContentsTextChild,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CreateUser => "create:user",
            EventType::CreateContentTextRoot => "create:content:text_root",
            EventType::CreateContentTextChild => "create:content:text_child",
            EventType::UpdateContentPoints => "update:content:points",
            EventType::FirewallBlockUsers => "firewall:block_users",
            EventType::FirewallBlockContentsTextRoot => "firewall:block_contents:text_root",
            EventType::FirewallBlockContentsTextChild => "firewall:block_contents:text_child",
            EventType::ModerationBlockUsers => "moderation:block_users",
            EventType::ModerationBlockContentsTextRoot => "moderation:block_contents:text_root",
            EventType::ModerationBlockContentsTextChild => "moderation:block_contents:text_child",
            EventType::ModerationUnblockUsers => "moderation:unblock_users",
            EventType::ModerationUnblockContentsTextRoot => {
                "moderation:unblock_contents:text_root"
            }
            EventType::ModerationUnblockContentsTextChild => {
                "moderation:unblock_contents:text_child"
            }
        }
    }

    pub fn is_firewall(&self) -> bool {
        matches!(
            self,
            EventType::FirewallBlockUsers
                | EventType::FirewallBlockContentsTextRoot
                | EventType::FirewallBlockContentsTextChild
        )
    }

    /// The moderation event type that resolves a firewall event with `action`.
    ///
    /// The suffix (`users`, `text_root`, `text_child`) mirrors the firewall event.
    /// Returns `None` for anything that is not a firewall event.
    pub fn resolved_by(&self, action: ReviewAction) -> Option<EventType> {
        let resolved = match (self, action) {
            (EventType::FirewallBlockUsers, ReviewAction::Confirm) => {
                EventType::ModerationBlockUsers
            }
            (EventType::FirewallBlockUsers, ReviewAction::Undo) => {
                EventType::ModerationUnblockUsers
            }
            (EventType::FirewallBlockContentsTextRoot, ReviewAction::Confirm) => {
                EventType::ModerationBlockContentsTextRoot
            }
            (EventType::FirewallBlockContentsTextRoot, ReviewAction::Undo) => {
                EventType::ModerationUnblockContentsTextRoot
            }
            (EventType::FirewallBlockContentsTextChild, ReviewAction::Confirm) => {
                EventType::ModerationBlockContentsTextChild
            }
            (EventType::FirewallBlockContentsTextChild, ReviewAction::Undo) => {
                EventType::ModerationUnblockContentsTextChild
            }
            _ => return None,
        };
        Some(resolved)
    }

    /// Which review action produced a moderation event, if this is one.
    pub fn review_action(&self) -> Option<ReviewAction> {
        match self {
            EventType::ModerationBlockUsers
            | EventType::ModerationBlockContentsTextRoot
            | EventType::ModerationBlockContentsTextChild => Some(ReviewAction::Confirm),
            EventType::ModerationUnblockUsers
            | EventType::ModerationUnblockContentsTextRoot
            | EventType::ModerationUnblockContentsTextChild => Some(ReviewAction::Undo),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown event type: {}", s))
    }
}

/// The entities a firewall or moderation event acts on.
///
/// Serialized as `{"contents": [...]}` or `{"users": [...]}` when flattened
/// into the event metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockTarget {
    Contents(Vec<Uuid>),
    Users(Vec<Uuid>),
}

impl BlockTarget {
    pub fn ids(&self) -> &[Uuid] {
        match self {
            BlockTarget::Contents(ids) | BlockTarget::Users(ids) => ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallMetadata {
    pub from_rule: FirewallRule,
    #[serde(flatten)]
    pub target: BlockTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationMetadata {
    /// Back-reference to the firewall event being resolved. Lookup only.
    pub related_events: Vec<Uuid>,
    #[serde(flatten)]
    pub target: BlockTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsMetadata {
    pub content_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedMetadata {
    pub id: Uuid,
}

/// Variant-shaped payload; which variant applies depends on the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventMetadata {
    Firewall(FirewallMetadata),
    Moderation(ModerationMetadata),
    Points(PointsMetadata),
    Created(CreatedMetadata),
}

/// A single immutable ledger event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub originator_user_id: Option<Uuid>,
    pub originator_ip: IpAddr,
    pub metadata: EventMetadata,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Build a new event with a fresh time-ordered id.
    pub fn new(
        event_type: EventType,
        originator_user_id: Option<Uuid>,
        originator_ip: IpAddr,
        metadata: EventMetadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type,
            originator_user_id,
            originator_ip,
            metadata,
            created_at,
        }
    }

    /// The blocked entities named by a firewall or moderation event.
    pub fn target(&self) -> Option<&BlockTarget> {
        match &self.metadata {
            EventMetadata::Firewall(m) => Some(&m.target),
            EventMetadata::Moderation(m) => Some(&m.target),
            _ => None,
        }
    }

    pub fn from_rule(&self) -> Option<FirewallRule> {
        match &self.metadata {
            EventMetadata::Firewall(m) => Some(m.from_rule),
            _ => None,
        }
    }

    /// The firewall event this moderation event resolves.
    pub fn related_event(&self) -> Option<Uuid> {
        match &self.metadata {
            EventMetadata::Moderation(m) => m.related_events.first().copied(),
            _ => None,
        }
    }
}
