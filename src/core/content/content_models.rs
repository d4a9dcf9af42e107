// Content and account models - the subset of platform entities the firewall
// reads and mutates. Everything else about them belongs to other services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Published,
    Deleted,
    Firewall,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
            ContentStatus::Deleted => "deleted",
            ContentStatus::Firewall => "firewall",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ContentStatus::Draft),
            "published" => Ok(ContentStatus::Published),
            "deleted" => Ok(ContentStatus::Deleted),
            "firewall" => Ok(ContentStatus::Firewall),
            other => Err(format!("unknown content status: {}", other)),
        }
    }
}

/// Root contents start a thread; child contents reply to another content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Root,
    Child,
}

impl ContentKind {
    pub fn of(parent_id: Option<Uuid>) -> Self {
        if parent_id.is_some() {
            ContentKind::Child
        } else {
            ContentKind::Root
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Content {
    pub fn kind(&self) -> ContentKind {
        ContentKind::of(self.parent_id)
    }
}

/// Account state as far as the firewall is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Signed up but not activated yet
    Inactive,
    Active,
    /// Blocked by the firewall, pending review
    Firewall,
    /// Permanently banned by a moderator
    Nuked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Inactive => "inactive",
            AccountStatus::Active => "active",
            AccountStatus::Firewall => "firewall",
            AccountStatus::Nuked => "nuked",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(AccountStatus::Inactive),
            "active" => Ok(AccountStatus::Active),
            "firewall" => Ok(AccountStatus::Firewall),
            "nuked" => Ok(AccountStatus::Nuked),
            other => Err(format!("unknown account status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Whether the user accepts notification emails
    pub notifications: bool,
    pub features: Vec<String>,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// State of a blocked entity captured at the moment the firewall blocked it.
///
/// `undo` restores exactly these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedSnapshot {
    pub event_id: Uuid,
    pub entity_id: Uuid,
    /// Either a `ContentStatus` or an `AccountStatus`, depending on the event target
    pub prior_status: String,
    pub prior_deleted_at: Option<DateTime<Utc>>,
    pub prior_updated_at: DateTime<Utc>,
}

impl BlockedSnapshot {
    pub fn of_content(event_id: Uuid, content: &Content) -> Self {
        Self {
            event_id,
            entity_id: content.id,
            prior_status: content.status.as_str().to_string(),
            prior_deleted_at: content.deleted_at,
            prior_updated_at: content.updated_at,
        }
    }

    pub fn of_user(event_id: Uuid, user: &UserAccount) -> Self {
        Self {
            event_id,
            entity_id: user.id,
            prior_status: user.status.as_str().to_string(),
            prior_deleted_at: None,
            prior_updated_at: user.updated_at,
        }
    }
}
