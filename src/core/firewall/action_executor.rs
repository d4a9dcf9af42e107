// Firewall action execution - blocks the offending items caught by a rule.
//
// Runs inside the same transaction as the evaluation that produced the hit.
// For every offending item it captures a snapshot, flips the status to
// `firewall` and, for contents, offsets the points the content earned. One
// firewall event records the whole block.

use super::firewall_models::{Actor, FirewallHit};
use super::firewall_store::{FirewallError, FirewallTx};
use crate::core::content::{AccountStatus, BlockedSnapshot, ContentStatus};
use crate::core::events::{BlockTarget, Event, EventMetadata, FirewallMetadata};
use crate::core::ledger::reversal_entries;
use chrono::{DateTime, Utc};

#[derive(Debug, Default)]
pub struct FirewallActionExecutor;

impl FirewallActionExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Block every item in `hit` and append the firewall event.
    ///
    /// `deleted_at` is left as it was; `updated_at` becomes `now`.
    pub async fn execute<T: FirewallTx>(
        &self,
        tx: &mut T,
        hit: &FirewallHit,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Event, FirewallError> {
        let event = Event::new(
            hit.rule.firewall_event_type(),
            actor.user_id,
            actor.ip,
            EventMetadata::Firewall(FirewallMetadata {
                from_rule: hit.rule,
                target: hit.target.clone(),
            }),
            now,
        );
        tx.append_event(&event).await?;

        match &hit.target {
            BlockTarget::Contents(ids) => {
                let contents = tx.contents_by_ids(ids).await?;
                if contents.len() != ids.len() {
                    return Err(FirewallError::NotFound(
                        "offending content disappeared during the block".to_string(),
                    ));
                }

                for content in contents {
                    tx.save_snapshot(&BlockedSnapshot::of_content(event.id, &content))
                        .await?;
                    tx.update_content_state(
                        content.id,
                        ContentStatus::Firewall,
                        content.deleted_at,
                        now,
                    )
                    .await?;

                    let contribution = tx
                        .content_contribution(content.id, content.owner_id)
                        .await?;
                    for entry in reversal_entries(&contribution, event.id, now) {
                        tx.insert_entry(&entry).await?;
                    }
                }
            }
            BlockTarget::Users(ids) => {
                let users = tx.users_by_ids(ids).await?;
                if users.len() != ids.len() {
                    return Err(FirewallError::NotFound(
                        "offending user disappeared during the block".to_string(),
                    ));
                }

                for user in users {
                    tx.save_snapshot(&BlockedSnapshot::of_user(event.id, &user))
                        .await?;
                    tx.update_user_status(user.id, AccountStatus::Firewall, now)
                        .await?;
                }
            }
        }

        tracing::warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            blocked = hit.target.ids().len(),
            "Firewall block applied"
        );

        Ok(event)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock;
    use crate::core::content::{Content, UserAccount};
    use crate::core::events::EventType;
    use crate::core::firewall::{FirewallRule, FirewallStore};
    use crate::core::ledger::{BalanceType, LedgerEntry};
    use crate::infra::memory::InMemoryFirewallStore;
    use chrono::Duration;
    use std::net::IpAddr;
    use uuid::Uuid;

    fn ip() -> IpAddr {
        "198.51.100.7".parse().unwrap()
    }

    fn content(owner_id: Uuid, at: DateTime<Utc>) -> Content {
        Content {
            id: Uuid::new_v4(),
            owner_id,
            parent_id: None,
            slug: None,
            title: None,
            status: ContentStatus::Published,
            created_at: at,
            updated_at: at,
            published_at: Some(at),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_block_flips_status_and_keeps_deleted_at() {
        let store = InMemoryFirewallStore::new();
        let owner = Uuid::new_v4();
        let earlier = clock::now() - Duration::seconds(3);
        let live = content(owner, earlier);
        let mut deleted = content(owner, earlier);
        deleted.status = ContentStatus::Deleted;
        deleted.deleted_at = Some(earlier + Duration::seconds(1));
        deleted.updated_at = earlier + Duration::seconds(1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_content(&live).await.unwrap();
        tx.insert_content(&deleted).await.unwrap();

        let now = clock::now();
        let hit = FirewallHit {
            rule: FirewallRule::CreateContentTextRoot,
            target: BlockTarget::Contents(vec![live.id, deleted.id]),
        };
        let event = FirewallActionExecutor::new()
            .execute(&mut tx, &hit, &Actor::user(owner, ip()), now)
            .await
            .unwrap();
        let snapshots = tx.snapshots_for(event.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(event.event_type, EventType::FirewallBlockContentsTextRoot);
        assert_eq!(event.originator_user_id, Some(owner));

        let blocked = store.find_content(deleted.id).await.unwrap().unwrap();
        assert_eq!(blocked.status, ContentStatus::Firewall);
        assert_eq!(blocked.deleted_at, deleted.deleted_at);
        assert_eq!(blocked.updated_at, now);

        assert_eq!(snapshots.len(), 2);
        let snapshot = snapshots.iter().find(|s| s.entity_id == deleted.id).unwrap();
        assert_eq!(snapshot.prior_status, "deleted");
        assert_eq!(snapshot.prior_updated_at, deleted.updated_at);
        assert_eq!(snapshot.prior_deleted_at, deleted.deleted_at);
    }

    #[tokio::test]
    async fn test_block_zeroes_point_contributions() {
        let store = InMemoryFirewallStore::new();
        let owner = Uuid::new_v4();
        let now = clock::now();
        let item = content(owner, now);
        let rating_event = Uuid::now_v7();

        let mut tx = store.begin().await.unwrap();
        tx.insert_content(&item).await.unwrap();
        for (balance_type, recipient) in [
            (BalanceType::ContentPoints, item.id),
            (BalanceType::UserPoints, owner),
        ] {
            tx.insert_entry(&LedgerEntry::new(
                balance_type,
                recipient,
                4,
                Some(item.id),
                rating_event,
                now,
            ))
            .await
            .unwrap();
        }
        // Points the owner earned elsewhere stay untouched
        tx.insert_entry(&LedgerEntry::new(
            BalanceType::UserPoints,
            owner,
            10,
            None,
            rating_event,
            now,
        ))
        .await
        .unwrap();

        let hit = FirewallHit {
            rule: FirewallRule::CreateContentTextRoot,
            target: BlockTarget::Contents(vec![item.id]),
        };
        FirewallActionExecutor::new()
            .execute(&mut tx, &hit, &Actor::user(owner, ip()), now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.balance(item.id).await.unwrap(), 0);
        assert_eq!(store.balance(owner).await.unwrap(), 10);
        // Reversal adds entries, never removes them
        assert_eq!(store.entries_for(item.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_block_users_sets_firewall_status() {
        let store = InMemoryFirewallStore::new();
        let now = clock::now();
        let user = UserAccount {
            id: Uuid::new_v4(),
            username: "burst".to_string(),
            email: "burst@example.com".to_string(),
            notifications: true,
            features: vec![],
            status: AccountStatus::Inactive,
            created_at: now,
            updated_at: now,
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        let hit = FirewallHit {
            rule: FirewallRule::CreateUser,
            target: BlockTarget::Users(vec![user.id]),
        };
        let event = FirewallActionExecutor::new()
            .execute(&mut tx, &hit, &Actor::anonymous(ip()), now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(event.event_type, EventType::FirewallBlockUsers);
        assert_eq!(event.originator_user_id, None);
        let stored = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Firewall);
    }

    #[tokio::test]
    async fn test_missing_offender_aborts_block() {
        let store = InMemoryFirewallStore::new();
        let mut tx = store.begin().await.unwrap();
        let hit = FirewallHit {
            rule: FirewallRule::CreateContentTextChild,
            target: BlockTarget::Contents(vec![Uuid::new_v4()]),
        };

        let result = FirewallActionExecutor::new()
            .execute(&mut tx, &hit, &Actor::anonymous(ip()), clock::now())
            .await;

        assert!(matches!(result, Err(FirewallError::NotFound(_))));
        drop(tx);
        assert!(store
            .events_of_type(EventType::FirewallBlockContentsTextChild)
            .await
            .unwrap()
            .is_empty());
    }
}
