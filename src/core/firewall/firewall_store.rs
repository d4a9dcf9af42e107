// Storage port for the firewall core.
//
// Every count-then-act sequence runs inside one `FirewallTx`. Dropping a
// transaction without calling `commit` discards all of its writes, so a
// failure half-way through never leaves partial state behind.

use super::firewall_models::FirewallRule;
use crate::core::content::{
    AccountStatus, BlockedSnapshot, Content, ContentKind, ContentStatus, UserAccount,
};
use crate::core::events::{Event, EventType};
use crate::core::ledger::{ContentContribution, LedgerEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("Rate limit exceeded for rule {rule}")]
    RateLimitExceeded { rule: FirewallRule, event_id: Uuid },

    #[error("Missing permission: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Firewall event already resolved by {resolving_event_id}")]
    AlreadyResolved { resolving_event_id: Uuid },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

/// Entry point to the store: opens transactions and serves plain reads.
#[async_trait]
pub trait FirewallStore: Send + Sync + 'static {
    type Tx: FirewallTx;

    /// Open a transaction. Implementations serialize writers so two
    /// transactions never both observe a sub-threshold count.
    async fn begin(&self) -> Result<Self::Tx, FirewallError>;

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, FirewallError>;

    async fn find_content(&self, id: Uuid) -> Result<Option<Content>, FirewallError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>, FirewallError>;

    /// Contents in the order of `ids`; unknown ids are skipped.
    async fn contents_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Content>, FirewallError>;

    /// Users in the order of `ids`; unknown ids are skipped.
    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UserAccount>, FirewallError>;

    /// Sum of all entries booked against a recipient.
    async fn balance(&self, recipient_id: Uuid) -> Result<i64, FirewallError>;

    /// Entries booked against a recipient, oldest first.
    async fn entries_for(&self, recipient_id: Uuid) -> Result<Vec<LedgerEntry>, FirewallError>;

    /// Events of one type, oldest first.
    async fn events_of_type(&self, event_type: EventType) -> Result<Vec<Event>, FirewallError>;
}

/// A unit of work against the store.
#[async_trait]
pub trait FirewallTx: Send {
    // ---- contents ----

    /// Contents of `kind` owned by `owner_id` created at or after `since`,
    /// excluding contents already in `firewall` status. Oldest first.
    async fn recent_contents(
        &mut self,
        owner_id: Uuid,
        kind: ContentKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<Content>, FirewallError>;

    async fn insert_content(&mut self, content: &Content) -> Result<(), FirewallError>;

    async fn slug_taken(&mut self, owner_id: Uuid, slug: &str) -> Result<bool, FirewallError>;

    /// Contents in the order of `ids`; unknown ids are skipped.
    async fn contents_by_ids(&mut self, ids: &[Uuid]) -> Result<Vec<Content>, FirewallError>;

    async fn update_content_state(
        &mut self,
        id: Uuid,
        status: ContentStatus,
        deleted_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), FirewallError>;

    // ---- users ----

    /// Users whose `create:user` event came from `ip` at or after `since`,
    /// excluding users already in `firewall` status. Oldest first.
    async fn recent_signups(
        &mut self,
        ip: IpAddr,
        since: DateTime<Utc>,
    ) -> Result<Vec<UserAccount>, FirewallError>;

    async fn insert_user(&mut self, user: &UserAccount) -> Result<(), FirewallError>;

    async fn username_taken(&mut self, username: &str) -> Result<bool, FirewallError>;

    /// Users in the order of `ids`; unknown ids are skipped.
    async fn users_by_ids(&mut self, ids: &[Uuid]) -> Result<Vec<UserAccount>, FirewallError>;

    async fn update_user_status(
        &mut self,
        id: Uuid,
        status: AccountStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), FirewallError>;

    // ---- firewall snapshots ----

    async fn save_snapshot(&mut self, snapshot: &BlockedSnapshot) -> Result<(), FirewallError>;

    async fn snapshots_for(&mut self, event_id: Uuid)
        -> Result<Vec<BlockedSnapshot>, FirewallError>;

    // ---- point ledger ----

    /// Net points attributed to a content, on the content and on its owner.
    async fn content_contribution(
        &mut self,
        content_id: Uuid,
        owner_id: Uuid,
    ) -> Result<ContentContribution, FirewallError>;

    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), FirewallError>;

    /// Entries caused by a given event, oldest first.
    async fn entries_originated_by(
        &mut self,
        event_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, FirewallError>;

    // ---- event ledger ----

    async fn append_event(&mut self, event: &Event) -> Result<(), FirewallError>;

    async fn find_event(&mut self, id: Uuid) -> Result<Option<Event>, FirewallError>;

    /// The moderation event that resolved `firewall_event_id`, if any.
    async fn find_resolution(
        &mut self,
        firewall_event_id: Uuid,
    ) -> Result<Option<Event>, FirewallError>;

    /// Make every write of this transaction visible.
    async fn commit(self) -> Result<(), FirewallError>;
}
