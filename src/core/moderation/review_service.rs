// Moderation review of firewall events.
//
// A trusted moderator either confirms a block (contents deleted, users nuked)
// or undoes it (prior state and points restored). The resolution check, the
// compensating writes and the resolving event all share one transaction, so a
// firewall event is resolved at most once.

use super::review_models::{
    ReviewAction, ReviewOutcome, ReviewRequest, READ_FIREWALL, REVIEW_FIREWALL,
};
use crate::core::content::{AccountStatus, BlockedSnapshot, ContentStatus};
use crate::core::events::{BlockTarget, Event, EventMetadata, ModerationMetadata};
use crate::core::firewall::{FirewallError, FirewallStore, FirewallTx};
use crate::core::ledger::restoration_entries;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct ModerationReviewer<S: FirewallStore> {
    store: Arc<S>,
}

impl<S: FirewallStore> ModerationReviewer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve a firewall event.
    ///
    /// Repeating the review that already resolved the event returns the
    /// existing resolving event with `replayed` set and writes nothing.
    pub async fn review(&self, request: ReviewRequest) -> Result<ReviewOutcome, FirewallError> {
        let mut tx = self.store.begin().await?;

        let reviewer = tx
            .users_by_ids(&[request.reviewer_id])
            .await?
            .into_iter()
            .next();
        let allowed = reviewer
            .map(|r| r.has_feature(READ_FIREWALL) && r.has_feature(REVIEW_FIREWALL))
            .unwrap_or(false);
        if !allowed {
            return Err(FirewallError::Forbidden(format!(
                "{} and {} are required to review firewall events",
                READ_FIREWALL, REVIEW_FIREWALL
            )));
        }

        let firewall_event = tx
            .find_event(request.firewall_event_id)
            .await?
            .filter(|e| e.event_type.is_firewall())
            .ok_or_else(|| {
                FirewallError::NotFound(format!(
                    "firewall event {}",
                    request.firewall_event_id
                ))
            })?;

        if let Some(existing) = tx.find_resolution(firewall_event.id).await? {
            if existing.event_type.review_action() == Some(request.action) {
                tracing::debug!(
                    firewall_event_id = %firewall_event.id,
                    resolving_event_id = %existing.id,
                    "Review replayed"
                );
                return Ok(ReviewOutcome {
                    event: existing,
                    replayed: true,
                });
            }
            return Err(FirewallError::AlreadyResolved {
                resolving_event_id: existing.id,
            });
        }

        let (event_type, target) = match (
            firewall_event.event_type.resolved_by(request.action),
            firewall_event.target(),
        ) {
            (Some(event_type), Some(target)) => (event_type, target.clone()),
            _ => {
                return Err(FirewallError::StorageError(format!(
                    "firewall event {} has no target",
                    firewall_event.id
                )))
            }
        };

        let now = request.requested_at;
        let event = Event::new(
            event_type,
            Some(request.reviewer_id),
            request.reviewer_ip,
            EventMetadata::Moderation(ModerationMetadata {
                related_events: vec![firewall_event.id],
                target: target.clone(),
            }),
            now,
        );
        tx.append_event(&event).await?;

        match request.action {
            ReviewAction::Confirm => confirm(&mut tx, &target, now).await?,
            ReviewAction::Undo => undo(&mut tx, &target, firewall_event.id, event.id, now).await?,
        }

        tx.commit().await?;

        tracing::info!(
            firewall_event_id = %firewall_event.id,
            resolving_event_id = %event.id,
            action = %request.action,
            reviewer_id = %request.reviewer_id,
            "Firewall event reviewed"
        );

        Ok(ReviewOutcome {
            event,
            replayed: false,
        })
    }
}

/// Make the block permanent for entities still held by the firewall.
async fn confirm<T: FirewallTx>(
    tx: &mut T,
    target: &BlockTarget,
    now: DateTime<Utc>,
) -> Result<(), FirewallError> {
    match target {
        BlockTarget::Contents(ids) => {
            for content in tx.contents_by_ids(ids).await? {
                if content.status != ContentStatus::Firewall {
                    continue;
                }
                tx.update_content_state(
                    content.id,
                    ContentStatus::Deleted,
                    content.deleted_at.or(Some(now)),
                    now,
                )
                .await?;
            }
        }
        BlockTarget::Users(ids) => {
            for user in tx.users_by_ids(ids).await? {
                if user.status != AccountStatus::Firewall {
                    continue;
                }
                tx.update_user_status(user.id, AccountStatus::Nuked, now)
                    .await?;
            }
        }
    }
    Ok(())
}

/// Restore entities still held by the firewall and give back their points.
async fn undo<T: FirewallTx>(
    tx: &mut T,
    target: &BlockTarget,
    firewall_event_id: Uuid,
    moderation_event_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), FirewallError> {
    let snapshots: HashMap<Uuid, BlockedSnapshot> = tx
        .snapshots_for(firewall_event_id)
        .await?
        .into_iter()
        .map(|s| (s.entity_id, s))
        .collect();

    match target {
        BlockTarget::Contents(ids) => {
            for content in tx.contents_by_ids(ids).await? {
                if content.status != ContentStatus::Firewall {
                    continue;
                }
                let Some(snapshot) = snapshots.get(&content.id) else {
                    tracing::warn!(content_id = %content.id, "No snapshot for blocked content");
                    continue;
                };
                let prior_status: ContentStatus = snapshot
                    .prior_status
                    .parse()
                    .map_err(FirewallError::StorageError)?;
                tx.update_content_state(
                    content.id,
                    prior_status,
                    snapshot.prior_deleted_at,
                    snapshot.prior_updated_at,
                )
                .await?;
            }
        }
        BlockTarget::Users(ids) => {
            for user in tx.users_by_ids(ids).await? {
                if user.status != AccountStatus::Firewall {
                    continue;
                }
                let Some(snapshot) = snapshots.get(&user.id) else {
                    tracing::warn!(user_id = %user.id, "No snapshot for blocked user");
                    continue;
                };
                let prior_status: AccountStatus = snapshot
                    .prior_status
                    .parse()
                    .map_err(FirewallError::StorageError)?;
                tx.update_user_status(user.id, prior_status, snapshot.prior_updated_at)
                    .await?;
            }
        }
    }

    let reversed = tx.entries_originated_by(firewall_event_id).await?;
    for entry in restoration_entries(&reversed, moderation_event_id, now) {
        tx.insert_entry(&entry).await?;
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock;
    use crate::core::content::{Content, UserAccount};
    use crate::core::events::{CreatedMetadata, EventType};
    use crate::core::firewall::{Actor, FirewallActionExecutor, FirewallHit, FirewallRule};
    use crate::core::ledger::{BalanceType, LedgerEntry};
    use crate::infra::memory::InMemoryFirewallStore;
    use chrono::Duration;
    use std::net::IpAddr;

    fn ip() -> IpAddr {
        "192.0.2.44".parse().unwrap()
    }

    fn account(name: &str, features: &[&str], status: AccountStatus) -> UserAccount {
        let at = clock::now() - Duration::seconds(60);
        UserAccount {
            id: Uuid::new_v4(),
            username: name.to_string(),
            email: format!("{}@example.com", name),
            notifications: true,
            features: features.iter().map(|f| f.to_string()).collect(),
            status,
            created_at: at,
            updated_at: at,
        }
    }

    fn content(owner_id: Uuid, status: ContentStatus) -> Content {
        let at = clock::now() - Duration::seconds(10);
        Content {
            id: Uuid::new_v4(),
            owner_id,
            parent_id: None,
            slug: None,
            title: None,
            status,
            created_at: at,
            updated_at: at,
            published_at: Some(at),
            deleted_at: if status == ContentStatus::Deleted {
                Some(at)
            } else {
                None
            },
        }
    }

    struct Fixture {
        store: Arc<InMemoryFirewallStore>,
        reviewer: ModerationReviewer<InMemoryFirewallStore>,
        moderator: UserAccount,
        owner: UserAccount,
        published: Content,
        deleted: Content,
        firewall_event: Event,
    }

    /// Two contents by one owner, one of them rated, blocked by the firewall.
    async fn blocked_contents() -> Fixture {
        let store = Arc::new(InMemoryFirewallStore::new());
        let moderator = account("mod", &[READ_FIREWALL, REVIEW_FIREWALL], AccountStatus::Active);
        let owner = account("owner", &[], AccountStatus::Active);
        let published = content(owner.id, ContentStatus::Published);
        let deleted = content(owner.id, ContentStatus::Deleted);

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&moderator).await.unwrap();
        tx.insert_user(&owner).await.unwrap();
        tx.insert_content(&published).await.unwrap();
        tx.insert_content(&deleted).await.unwrap();
        let rating = Uuid::now_v7();
        for (balance_type, recipient) in [
            (BalanceType::ContentPoints, published.id),
            (BalanceType::UserPoints, owner.id),
        ] {
            tx.insert_entry(&LedgerEntry::new(
                balance_type,
                recipient,
                3,
                Some(published.id),
                rating,
                published.created_at,
            ))
            .await
            .unwrap();
        }
        let firewall_event = FirewallActionExecutor::new()
            .execute(
                &mut tx,
                &FirewallHit {
                    rule: FirewallRule::CreateContentTextRoot,
                    target: BlockTarget::Contents(vec![published.id, deleted.id]),
                },
                &Actor::user(owner.id, ip()),
                clock::now(),
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        Fixture {
            reviewer: ModerationReviewer::new(store.clone()),
            store,
            moderator,
            owner,
            published,
            deleted,
            firewall_event,
        }
    }

    fn request(f: &Fixture, action: ReviewAction) -> ReviewRequest {
        ReviewRequest {
            firewall_event_id: f.firewall_event.id,
            action,
            reviewer_id: f.moderator.id,
            reviewer_ip: ip(),
            requested_at: clock::now(),
        }
    }

    #[tokio::test]
    async fn test_confirm_deletes_contents_and_keeps_points_reversed() {
        let f = blocked_contents().await;

        let outcome = f.reviewer.review(request(&f, ReviewAction::Confirm)).await.unwrap();

        assert!(!outcome.replayed);
        assert_eq!(outcome.event.event_type, EventType::ModerationBlockContentsTextRoot);
        assert_eq!(outcome.event.related_event(), Some(f.firewall_event.id));
        assert_eq!(outcome.event.originator_user_id, Some(f.moderator.id));

        let published = f.store.find_content(f.published.id).await.unwrap().unwrap();
        assert_eq!(published.status, ContentStatus::Deleted);
        assert_eq!(published.deleted_at, Some(outcome.event.created_at));

        let deleted = f.store.find_content(f.deleted.id).await.unwrap().unwrap();
        assert_eq!(deleted.status, ContentStatus::Deleted);
        assert_eq!(deleted.deleted_at, f.deleted.deleted_at);

        assert_eq!(f.store.balance(f.published.id).await.unwrap(), 0);
        assert_eq!(f.store.balance(f.owner.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_undo_restores_prior_state_and_points() {
        let f = blocked_contents().await;

        let outcome = f.reviewer.review(request(&f, ReviewAction::Undo)).await.unwrap();

        assert_eq!(outcome.event.event_type, EventType::ModerationUnblockContentsTextRoot);
        assert_eq!(
            f.store.find_content(f.published.id).await.unwrap().unwrap(),
            f.published
        );
        assert_eq!(
            f.store.find_content(f.deleted.id).await.unwrap().unwrap(),
            f.deleted
        );
        assert_eq!(f.store.balance(f.published.id).await.unwrap(), 3);
        assert_eq!(f.store.balance(f.owner.id).await.unwrap(), 3);

        // rating + reversal + restoration
        let entries = f.store.entries_for(f.published.id).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].originator_event_id, outcome.event.id);
    }

    #[tokio::test]
    async fn test_same_review_twice_is_replayed() {
        let f = blocked_contents().await;

        let first = f.reviewer.review(request(&f, ReviewAction::Confirm)).await.unwrap();
        let second = f.reviewer.review(request(&f, ReviewAction::Confirm)).await.unwrap();

        assert!(second.replayed);
        assert_eq!(second.event.id, first.event.id);
        let resolutions = f
            .store
            .events_of_type(EventType::ModerationBlockContentsTextRoot)
            .await
            .unwrap();
        assert_eq!(resolutions.len(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_review_is_rejected() {
        let f = blocked_contents().await;
        let first = f.reviewer.review(request(&f, ReviewAction::Confirm)).await.unwrap();

        let result = f.reviewer.review(request(&f, ReviewAction::Undo)).await;

        match result {
            Err(FirewallError::AlreadyResolved { resolving_event_id }) => {
                assert_eq!(resolving_event_id, first.event.id)
            }
            other => panic!("expected a conflict, got {:?}", other),
        }
        let published = f.store.find_content(f.published.id).await.unwrap().unwrap();
        assert_eq!(published.status, ContentStatus::Deleted);
    }

    #[tokio::test]
    async fn test_missing_permission_is_forbidden() {
        let f = blocked_contents().await;
        let mut req = request(&f, ReviewAction::Undo);
        req.reviewer_id = f.owner.id;

        let result = f.reviewer.review(req).await;

        assert!(matches!(result, Err(FirewallError::Forbidden(_))));
        assert!(f
            .store
            .events_of_type(EventType::ModerationUnblockContentsTextRoot)
            .await
            .unwrap()
            .is_empty());
        let published = f.store.find_content(f.published.id).await.unwrap().unwrap();
        assert_eq!(published.status, ContentStatus::Firewall);
    }

    #[tokio::test]
    async fn test_read_permission_alone_is_not_enough() {
        let f = blocked_contents().await;
        let reader = account("reader", &[READ_FIREWALL], AccountStatus::Active);
        let mut tx = f.store.begin().await.unwrap();
        tx.insert_user(&reader).await.unwrap();
        tx.commit().await.unwrap();

        let mut req = request(&f, ReviewAction::Confirm);
        req.reviewer_id = reader.id;

        assert!(matches!(
            f.reviewer.review(req).await,
            Err(FirewallError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_or_non_firewall_event_is_not_found() {
        let f = blocked_contents().await;

        let mut unknown = request(&f, ReviewAction::Confirm);
        unknown.firewall_event_id = Uuid::now_v7();
        assert!(matches!(
            f.reviewer.review(unknown).await,
            Err(FirewallError::NotFound(_))
        ));

        let creation = Event::new(
            EventType::CreateUser,
            None,
            ip(),
            EventMetadata::Created(CreatedMetadata { id: f.owner.id }),
            clock::now(),
        );
        let mut tx = f.store.begin().await.unwrap();
        tx.append_event(&creation).await.unwrap();
        tx.commit().await.unwrap();

        let mut wrong_type = request(&f, ReviewAction::Confirm);
        wrong_type.firewall_event_id = creation.id;
        assert!(matches!(
            f.reviewer.review(wrong_type).await,
            Err(FirewallError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_entities_no_longer_blocked_are_left_alone() {
        let f = blocked_contents().await;
        let restored_at = clock::now();
        let mut tx = f.store.begin().await.unwrap();
        tx.update_content_state(f.published.id, ContentStatus::Published, None, restored_at)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        f.reviewer.review(request(&f, ReviewAction::Confirm)).await.unwrap();

        let published = f.store.find_content(f.published.id).await.unwrap().unwrap();
        assert_eq!(published.status, ContentStatus::Published);
        assert_eq!(published.updated_at, restored_at);
    }

    async fn blocked_user(fixture_store: &Arc<InMemoryFirewallStore>) -> (UserAccount, Event) {
        let user = account("signup", &[], AccountStatus::Inactive);
        let mut tx = fixture_store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        let event = FirewallActionExecutor::new()
            .execute(
                &mut tx,
                &FirewallHit {
                    rule: FirewallRule::CreateUser,
                    target: BlockTarget::Users(vec![user.id]),
                },
                &Actor::anonymous(ip()),
                clock::now(),
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (user, event)
    }

    #[tokio::test]
    async fn test_confirm_nukes_and_undo_restores_users() {
        let f = blocked_contents().await;
        let (confirmed, confirm_event) = blocked_user(&f.store).await;
        let (restored, undo_event) = blocked_user(&f.store).await;

        let mut req = request(&f, ReviewAction::Confirm);
        req.firewall_event_id = confirm_event.id;
        let outcome = f.reviewer.review(req).await.unwrap();
        assert_eq!(outcome.event.event_type, EventType::ModerationBlockUsers);

        let mut req = request(&f, ReviewAction::Undo);
        req.firewall_event_id = undo_event.id;
        let outcome = f.reviewer.review(req).await.unwrap();
        assert_eq!(outcome.event.event_type, EventType::ModerationUnblockUsers);

        let nuked = f.store.find_user(confirmed.id).await.unwrap().unwrap();
        assert_eq!(nuked.status, AccountStatus::Nuked);
        assert_eq!(f.store.find_user(restored.id).await.unwrap().unwrap(), restored);
    }
}
