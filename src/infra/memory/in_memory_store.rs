// In-memory implementation of FirewallStore.
//
// A transaction holds the store's async mutex for its whole lifetime and
// works on a private copy of the state. `commit` swaps the copy in; dropping
// the transaction throws it away. That gives the same all-or-nothing,
// one-writer-at-a-time behaviour as the SQLite store, which makes this store
// suitable for exercising the core logic in tests.

use crate::core::content::{
    AccountStatus, BlockedSnapshot, Content, ContentKind, ContentStatus, UserAccount,
};
use crate::core::events::{Event, EventMetadata, EventType};
use crate::core::firewall::{FirewallError, FirewallStore, FirewallTx};
use crate::core::ledger::{BalanceType, ContentContribution, LedgerEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<UserAccount>,
    contents: Vec<Content>,
    events: Vec<Event>,
    entries: Vec<LedgerEntry>,
    snapshots: Vec<BlockedSnapshot>,
}

impl MemoryState {
    fn content(&self, id: Uuid) -> Option<&Content> {
        self.contents.iter().find(|c| c.id == id)
    }

    fn user(&self, id: Uuid) -> Option<&UserAccount> {
        self.users.iter().find(|u| u.id == id)
    }

    fn contents_by_ids(&self, ids: &[Uuid]) -> Vec<Content> {
        ids.iter().filter_map(|id| self.content(*id).cloned()).collect()
    }

    fn users_by_ids(&self, ids: &[Uuid]) -> Vec<UserAccount> {
        ids.iter().filter_map(|id| self.user(*id).cloned()).collect()
    }

    fn sum_entries(&self, filter: impl Fn(&LedgerEntry) -> bool) -> i64 {
        self.entries.iter().filter(|e| filter(e)).map(|e| e.amount).sum()
    }
}

/// In-memory FirewallStore.
#[derive(Clone, Default)]
pub struct InMemoryFirewallStore {
    state: Arc<Mutex<MemoryState>>,
    fail_commits: Arc<AtomicBool>,
}

impl InMemoryFirewallStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `commit` fail, to simulate a storage outage.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

pub struct InMemoryFirewallTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: bool,
}

#[async_trait]
impl FirewallStore for InMemoryFirewallStore {
    type Tx = InMemoryFirewallTx;

    async fn begin(&self) -> Result<Self::Tx, FirewallError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryFirewallTx {
            guard,
            working,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        })
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, FirewallError> {
        let state = self.state.lock().await;
        Ok(state.events.iter().find(|e| e.id == id).cloned())
    }

    async fn find_content(&self, id: Uuid) -> Result<Option<Content>, FirewallError> {
        Ok(self.state.lock().await.content(id).cloned())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>, FirewallError> {
        Ok(self.state.lock().await.user(id).cloned())
    }

    async fn contents_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Content>, FirewallError> {
        Ok(self.state.lock().await.contents_by_ids(ids))
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UserAccount>, FirewallError> {
        Ok(self.state.lock().await.users_by_ids(ids))
    }

    async fn balance(&self, recipient_id: Uuid) -> Result<i64, FirewallError> {
        let state = self.state.lock().await;
        Ok(state.sum_entries(|e| e.recipient_id == recipient_id))
    }

    async fn entries_for(&self, recipient_id: Uuid) -> Result<Vec<LedgerEntry>, FirewallError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.recipient_id == recipient_id)
            .cloned()
            .collect())
    }

    async fn events_of_type(&self, event_type: EventType) -> Result<Vec<Event>, FirewallError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FirewallTx for InMemoryFirewallTx {
    async fn recent_contents(
        &mut self,
        owner_id: Uuid,
        kind: ContentKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<Content>, FirewallError> {
        let mut found: Vec<Content> = self
            .working
            .contents
            .iter()
            .filter(|c| {
                c.owner_id == owner_id
                    && c.kind() == kind
                    && c.created_at >= since
                    && c.status != ContentStatus::Firewall
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(found)
    }

    async fn insert_content(&mut self, content: &Content) -> Result<(), FirewallError> {
        if self.working.content(content.id).is_some() {
            return Err(FirewallError::StorageError(format!(
                "duplicate content id {}",
                content.id
            )));
        }
        self.working.contents.push(content.clone());
        Ok(())
    }

    async fn slug_taken(&mut self, owner_id: Uuid, slug: &str) -> Result<bool, FirewallError> {
        Ok(self
            .working
            .contents
            .iter()
            .any(|c| c.owner_id == owner_id && c.slug.as_deref() == Some(slug)))
    }

    async fn contents_by_ids(&mut self, ids: &[Uuid]) -> Result<Vec<Content>, FirewallError> {
        Ok(self.working.contents_by_ids(ids))
    }

    async fn update_content_state(
        &mut self,
        id: Uuid,
        status: ContentStatus,
        deleted_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), FirewallError> {
        let content = self
            .working
            .contents
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| FirewallError::NotFound(format!("content {}", id)))?;
        content.status = status;
        content.deleted_at = deleted_at;
        content.updated_at = updated_at;
        Ok(())
    }

    async fn recent_signups(
        &mut self,
        ip: IpAddr,
        since: DateTime<Utc>,
    ) -> Result<Vec<UserAccount>, FirewallError> {
        let mut signups: Vec<(&Event, Uuid)> = self
            .working
            .events
            .iter()
            .filter(|e| {
                e.event_type == EventType::CreateUser
                    && e.originator_ip == ip
                    && e.created_at >= since
            })
            .filter_map(|e| match &e.metadata {
                EventMetadata::Created(m) => Some((e, m.id)),
                _ => None,
            })
            .collect();
        signups.sort_by(|(a, _), (b, _)| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        Ok(signups
            .into_iter()
            .filter_map(|(_, user_id)| self.working.user(user_id))
            .filter(|u| u.status != AccountStatus::Firewall)
            .cloned()
            .collect())
    }

    async fn insert_user(&mut self, user: &UserAccount) -> Result<(), FirewallError> {
        if self.working.user(user.id).is_some() {
            return Err(FirewallError::StorageError(format!(
                "duplicate user id {}",
                user.id
            )));
        }
        self.working.users.push(user.clone());
        Ok(())
    }

    async fn username_taken(&mut self, username: &str) -> Result<bool, FirewallError> {
        Ok(self
            .working
            .users
            .iter()
            .any(|u| u.username.eq_ignore_ascii_case(username)))
    }

    async fn users_by_ids(&mut self, ids: &[Uuid]) -> Result<Vec<UserAccount>, FirewallError> {
        Ok(self.working.users_by_ids(ids))
    }

    async fn update_user_status(
        &mut self,
        id: Uuid,
        status: AccountStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), FirewallError> {
        let user = self
            .working
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| FirewallError::NotFound(format!("user {}", id)))?;
        user.status = status;
        user.updated_at = updated_at;
        Ok(())
    }

    async fn save_snapshot(&mut self, snapshot: &BlockedSnapshot) -> Result<(), FirewallError> {
        self.working.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn snapshots_for(
        &mut self,
        event_id: Uuid,
    ) -> Result<Vec<BlockedSnapshot>, FirewallError> {
        Ok(self
            .working
            .snapshots
            .iter()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn content_contribution(
        &mut self,
        content_id: Uuid,
        owner_id: Uuid,
    ) -> Result<ContentContribution, FirewallError> {
        let content_net = self.working.sum_entries(|e| {
            e.balance_type == BalanceType::ContentPoints && e.recipient_id == content_id
        });
        let owner_net = self.working.sum_entries(|e| {
            e.balance_type == BalanceType::UserPoints
                && e.recipient_id == owner_id
                && e.content_id == Some(content_id)
        });
        Ok(ContentContribution {
            content_id,
            owner_id,
            content_net,
            owner_net,
        })
    }

    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), FirewallError> {
        self.working.entries.push(entry.clone());
        Ok(())
    }

    async fn entries_originated_by(
        &mut self,
        event_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, FirewallError> {
        Ok(self
            .working
            .entries
            .iter()
            .filter(|e| e.originator_event_id == event_id)
            .cloned()
            .collect())
    }

    async fn append_event(&mut self, event: &Event) -> Result<(), FirewallError> {
        if let Some(related) = event.related_event() {
            if self
                .working
                .events
                .iter()
                .any(|e| e.related_event() == Some(related))
            {
                return Err(FirewallError::StorageError(format!(
                    "event {} is already resolved",
                    related
                )));
            }
        }
        self.working.events.push(event.clone());
        Ok(())
    }

    async fn find_event(&mut self, id: Uuid) -> Result<Option<Event>, FirewallError> {
        Ok(self.working.events.iter().find(|e| e.id == id).cloned())
    }

    async fn find_resolution(
        &mut self,
        firewall_event_id: Uuid,
    ) -> Result<Option<Event>, FirewallError> {
        Ok(self
            .working
            .events
            .iter()
            .find(|e| e.related_event() == Some(firewall_event_id))
            .cloned())
    }

    async fn commit(mut self) -> Result<(), FirewallError> {
        if self.fail_commit {
            return Err(FirewallError::StorageError(
                "simulated commit failure".to_string(),
            ));
        }
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock;
    use crate::core::events::CreatedMetadata;

    fn content(owner_id: Uuid, created_at: DateTime<Utc>) -> Content {
        Content {
            id: Uuid::new_v4(),
            owner_id,
            parent_id: None,
            slug: None,
            title: None,
            status: ContentStatus::Published,
            created_at,
            updated_at: created_at,
            published_at: Some(created_at),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = InMemoryFirewallStore::new();
        let owner = Uuid::new_v4();
        let item = content(owner, clock::now());

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_content(&item).await.unwrap();
            // dropped without commit
        }
        assert!(store.find_content(item.id).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.insert_content(&item).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.find_content(item.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_state_untouched() {
        let store = InMemoryFirewallStore::new();
        store.fail_commits(true);

        let item = content(Uuid::new_v4(), clock::now());
        let mut tx = store.begin().await.unwrap();
        tx.insert_content(&item).await.unwrap();
        assert!(tx.commit().await.is_err());

        assert!(store.find_content(item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_contents_excludes_firewall_and_old_items() {
        let store = InMemoryFirewallStore::new();
        let owner = Uuid::new_v4();
        let now = clock::now();

        let old = content(owner, now - chrono::Duration::seconds(60));
        let fresh = content(owner, now);
        let mut blocked = content(owner, now);
        blocked.status = ContentStatus::Firewall;

        let mut tx = store.begin().await.unwrap();
        for c in [&old, &fresh, &blocked] {
            tx.insert_content(c).await.unwrap();
        }
        let recent = tx
            .recent_contents(owner, ContentKind::Root, now - chrono::Duration::seconds(5))
            .await
            .unwrap();

        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, fresh.id);
    }

    #[tokio::test]
    async fn test_second_resolution_is_rejected() {
        let store = InMemoryFirewallStore::new();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let firewall_id = Uuid::now_v7();
        let resolution = |id| {
            Event::new(
                EventType::ModerationBlockUsers,
                None,
                ip,
                EventMetadata::Moderation(crate::core::events::ModerationMetadata {
                    related_events: vec![id],
                    target: crate::core::events::BlockTarget::Users(vec![]),
                }),
                clock::now(),
            )
        };

        let mut tx = store.begin().await.unwrap();
        tx.append_event(&resolution(firewall_id)).await.unwrap();
        assert!(tx.append_event(&resolution(firewall_id)).await.is_err());

        let created = Event::new(
            EventType::CreateUser,
            None,
            ip,
            EventMetadata::Created(CreatedMetadata { id: Uuid::new_v4() }),
            clock::now(),
        );
        tx.append_event(&created).await.unwrap();
    }
}
