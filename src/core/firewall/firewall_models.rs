// Firewall domain models - rules, their settings, and the shapes flowing
// between the evaluator, the executor and the service.

use crate::core::content::{ContentKind, ContentStatus};
use crate::core::events::{BlockTarget, EventType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// A rate rule. The serialized name is the `from_rule` stored on firewall events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FirewallRule {
    /// Several accounts created from one IP
    #[serde(rename = "create:user")]
    CreateUser,
    /// Several root contents created by one user
    #[serde(rename = "create:content:text_root")]
    CreateContentTextRoot,
    /// Several child contents created by one user, across any parents
    #[serde(rename = "create:content:text_child")]
    CreateContentTextChild,
}

impl FirewallRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirewallRule::CreateUser => "create:user",
            FirewallRule::CreateContentTextRoot => "create:content:text_root",
            FirewallRule::CreateContentTextChild => "create:content:text_child",
        }
    }

    pub fn for_content(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Root => FirewallRule::CreateContentTextRoot,
            ContentKind::Child => FirewallRule::CreateContentTextChild,
        }
    }

    /// Event type written when this rule fires.
    pub fn firewall_event_type(&self) -> EventType {
        match self {
            FirewallRule::CreateUser => EventType::FirewallBlockUsers,
            FirewallRule::CreateContentTextRoot => EventType::FirewallBlockContentsTextRoot,
            FirewallRule::CreateContentTextChild => EventType::FirewallBlockContentsTextChild,
        }
    }

    /// Event type written when an attempt under this rule is allowed.
    pub fn creation_event_type(&self) -> EventType {
        match self {
            FirewallRule::CreateUser => EventType::CreateUser,
            FirewallRule::CreateContentTextRoot => EventType::CreateContentTextRoot,
            FirewallRule::CreateContentTextChild => EventType::CreateContentTextChild,
        }
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning for a single rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSettings {
    pub enabled: bool,
    /// Prior items plus the current attempt needed to fire
    pub threshold: u32,
    /// Trailing window, anchored at request time
    pub window_secs: u64,
}

impl RuleSettings {
    /// Oldest creation time still counted for a request made at `requested_at`.
    pub fn window_start(&self, requested_at: DateTime<Utc>) -> DateTime<Utc> {
        let window = i64::try_from(self.window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        requested_at
            .checked_sub_signed(window)
            .unwrap_or(DateTime::UNIX_EPOCH)
            .max(DateTime::UNIX_EPOCH)
    }
}

/// Configuration for every firewall rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallConfig {
    pub create_user: RuleSettings,
    pub create_content_text_root: RuleSettings,
    pub create_content_text_child: RuleSettings,
}

impl FirewallConfig {
    pub fn rule(&self, rule: FirewallRule) -> &RuleSettings {
        match rule {
            FirewallRule::CreateUser => &self.create_user,
            FirewallRule::CreateContentTextRoot => &self.create_content_text_root,
            FirewallRule::CreateContentTextChild => &self.create_content_text_child,
        }
    }

    pub fn rule_mut(&mut self, rule: FirewallRule) -> &mut RuleSettings {
        match rule {
            FirewallRule::CreateUser => &mut self.create_user,
            FirewallRule::CreateContentTextRoot => &mut self.create_content_text_root,
            FirewallRule::CreateContentTextChild => &mut self.create_content_text_child,
        }
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            create_user: RuleSettings {
                enabled: true,
                threshold: 3,   // 3 signups...
                window_secs: 60, // ...from one IP in a minute
            },
            create_content_text_root: RuleSettings {
                enabled: true,
                threshold: 3,
                window_secs: 5,
            },
            create_content_text_child: RuleSettings {
                enabled: true,
                threshold: 3,
                window_secs: 5,
            },
        }
    }
}

/// Who is making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// `None` for anonymous actors
    pub user_id: Option<Uuid>,
    pub ip: IpAddr,
}

impl Actor {
    pub fn user(user_id: Uuid, ip: IpAddr) -> Self {
        Self {
            user_id: Some(user_id),
            ip,
        }
    }

    pub fn anonymous(ip: IpAddr) -> Self {
        Self { user_id: None, ip }
    }
}

/// The key a rule counts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorIdentity {
    User(Uuid),
    Ip(IpAddr),
}

/// A creation request as seen by the evaluator.
#[derive(Debug, Clone)]
pub struct CreationAttempt {
    pub rule: FirewallRule,
    pub identity: ActorIdentity,
    pub requested_at: DateTime<Utc>,
}

/// A rule that fired, and the prior items it caught.
#[derive(Debug, Clone, PartialEq)]
pub struct FirewallHit {
    pub rule: FirewallRule,
    /// Offending items, oldest first
    pub target: BlockTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allowed,
    Blocked(FirewallHit),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

/// Request to create a content, coming from the content controller.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub owner_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub slug: Option<String>,
    pub title: Option<String>,
    /// `Draft` or `Published`
    pub status: ContentStatus,
    pub origin_ip: IpAddr,
    pub requested_at: DateTime<Utc>,
}

/// Request to create an account, coming from the signup controller.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub notifications: bool,
    pub origin_ip: IpAddr,
    pub requested_at: DateTime<Utc>,
}
