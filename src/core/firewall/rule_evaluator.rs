// Rate rule evaluation.
//
// Rate counters are never kept in memory. Each evaluation counts the actor's
// recent rows inside the caller's transaction, with the window anchored at the
// request time, so the result survives restarts and is consistent with the
// writes that follow in the same transaction.

use super::firewall_models::{
    ActorIdentity, CreationAttempt, FirewallConfig, FirewallHit, FirewallRule, Verdict,
};
use super::firewall_store::{FirewallError, FirewallTx};
use crate::core::content::ContentKind;
use crate::core::events::BlockTarget;

pub struct RateRuleEvaluator {
    config: FirewallConfig,
}

impl RateRuleEvaluator {
    pub fn new(config: FirewallConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FirewallConfig {
        &self.config
    }

    /// Decide whether `attempt` may proceed.
    ///
    /// Counts the actor's prior items of the same kind inside the rule's
    /// window, ignoring items the firewall already caught. When the prior
    /// items plus this attempt reach the threshold, the prior items are
    /// returned as offenders, oldest first.
    pub async fn evaluate<T: FirewallTx>(
        &self,
        tx: &mut T,
        attempt: &CreationAttempt,
    ) -> Result<Verdict, FirewallError> {
        let settings = self.config.rule(attempt.rule);
        if !settings.enabled {
            return Ok(Verdict::Allowed);
        }

        let since = settings.window_start(attempt.requested_at);

        let target = match (attempt.rule, attempt.identity) {
            (FirewallRule::CreateUser, ActorIdentity::Ip(ip)) => {
                let users = tx.recent_signups(ip, since).await?;
                BlockTarget::Users(users.into_iter().map(|u| u.id).collect())
            }
            (FirewallRule::CreateContentTextRoot, ActorIdentity::User(owner_id)) => {
                let contents = tx.recent_contents(owner_id, ContentKind::Root, since).await?;
                BlockTarget::Contents(contents.into_iter().map(|c| c.id).collect())
            }
            (FirewallRule::CreateContentTextChild, ActorIdentity::User(owner_id)) => {
                let contents = tx
                    .recent_contents(owner_id, ContentKind::Child, since)
                    .await?;
                BlockTarget::Contents(contents.into_iter().map(|c| c.id).collect())
            }
            (rule, identity) => {
                return Err(FirewallError::Validation(format!(
                    "Rule {} cannot be evaluated for {:?}",
                    rule, identity
                )));
            }
        };

        let prior = target.ids().len();
        if prior + 1 < settings.threshold as usize || target.is_empty() {
            return Ok(Verdict::Allowed);
        }

        tracing::info!(
            rule = %attempt.rule,
            identity = ?attempt.identity,
            prior,
            threshold = settings.threshold,
            "Firewall rule fired"
        );

        Ok(Verdict::Blocked(FirewallHit {
            rule: attempt.rule,
            target,
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock;
    use crate::core::content::{Content, ContentStatus};
    use crate::core::firewall::{FirewallStore, RuleSettings};
    use crate::infra::memory::InMemoryFirewallStore;
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    fn content(owner_id: Uuid, parent_id: Option<Uuid>, created_at: DateTime<Utc>) -> Content {
        Content {
            id: Uuid::new_v4(),
            owner_id,
            parent_id,
            slug: None,
            title: None,
            status: ContentStatus::Published,
            created_at,
            updated_at: created_at,
            published_at: Some(created_at),
            deleted_at: None,
        }
    }

    fn attempt(rule: FirewallRule, owner_id: Uuid, at: DateTime<Utc>) -> CreationAttempt {
        CreationAttempt {
            rule,
            identity: ActorIdentity::User(owner_id),
            requested_at: at,
        }
    }

    async fn seed(store: &InMemoryFirewallStore, items: &[Content]) {
        let mut tx = store.begin().await.unwrap();
        for item in items {
            tx.insert_content(item).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_two_prior_items_allow_nothing_more() {
        let store = InMemoryFirewallStore::new();
        let evaluator = RateRuleEvaluator::new(FirewallConfig::default());
        let owner = Uuid::new_v4();
        let now = clock::now();
        let first = content(owner, None, now - Duration::seconds(2));
        let second = content(owner, None, now - Duration::seconds(1));
        // Inserted out of order on purpose
        seed(&store, &[second.clone(), first.clone()]).await;

        let mut tx = store.begin().await.unwrap();
        let verdict = evaluator
            .evaluate(&mut tx, &attempt(FirewallRule::CreateContentTextRoot, owner, now))
            .await
            .unwrap();

        assert_eq!(
            verdict,
            Verdict::Blocked(FirewallHit {
                rule: FirewallRule::CreateContentTextRoot,
                target: BlockTarget::Contents(vec![first.id, second.id]),
            })
        );
    }

    #[tokio::test]
    async fn test_one_prior_item_is_allowed() {
        let store = InMemoryFirewallStore::new();
        let evaluator = RateRuleEvaluator::new(FirewallConfig::default());
        let owner = Uuid::new_v4();
        let now = clock::now();
        seed(&store, &[content(owner, None, now)]).await;

        let mut tx = store.begin().await.unwrap();
        let verdict = evaluator
            .evaluate(&mut tx, &attempt(FirewallRule::CreateContentTextRoot, owner, now))
            .await
            .unwrap();

        assert!(verdict.is_allowed());
    }

    #[tokio::test]
    async fn test_items_outside_window_are_not_counted() {
        let store = InMemoryFirewallStore::new();
        let evaluator = RateRuleEvaluator::new(FirewallConfig::default());
        let owner = Uuid::new_v4();
        let now = clock::now();
        seed(
            &store,
            &[
                content(owner, None, now - Duration::seconds(30)),
                content(owner, None, now - Duration::seconds(20)),
            ],
        )
        .await;

        let mut tx = store.begin().await.unwrap();
        let verdict = evaluator
            .evaluate(&mut tx, &attempt(FirewallRule::CreateContentTextRoot, owner, now))
            .await
            .unwrap();

        assert!(verdict.is_allowed());
    }

    #[tokio::test]
    async fn test_deleted_and_draft_items_count_but_firewalled_do_not() {
        let store = InMemoryFirewallStore::new();
        let evaluator = RateRuleEvaluator::new(FirewallConfig::default());
        let owner = Uuid::new_v4();
        let now = clock::now();

        let mut deleted = content(owner, None, now);
        deleted.status = ContentStatus::Deleted;
        deleted.deleted_at = Some(now);
        let mut draft = content(owner, None, now);
        draft.status = ContentStatus::Draft;
        let mut blocked = content(owner, None, now);
        blocked.status = ContentStatus::Firewall;
        seed(&store, &[deleted.clone(), blocked, draft.clone()]).await;

        let mut tx = store.begin().await.unwrap();
        let verdict = evaluator
            .evaluate(&mut tx, &attempt(FirewallRule::CreateContentTextRoot, owner, now))
            .await
            .unwrap();

        match verdict {
            Verdict::Blocked(hit) => {
                let mut ids = hit.target.ids().to_vec();
                ids.sort();
                let mut expected = vec![deleted.id, draft.id];
                expected.sort();
                assert_eq!(ids, expected);
            }
            Verdict::Allowed => panic!("expected the rule to fire"),
        }
    }

    #[tokio::test]
    async fn test_child_rule_counts_across_parents_but_not_roots() {
        let store = InMemoryFirewallStore::new();
        let evaluator = RateRuleEvaluator::new(FirewallConfig::default());
        let owner = Uuid::new_v4();
        let now = clock::now();
        let a = content(owner, Some(Uuid::new_v4()), now);
        let b = content(owner, Some(Uuid::new_v4()), now);
        seed(&store, &[a, b, content(owner, None, now)]).await;

        let mut tx = store.begin().await.unwrap();
        let child = evaluator
            .evaluate(&mut tx, &attempt(FirewallRule::CreateContentTextChild, owner, now))
            .await
            .unwrap();
        let root = evaluator
            .evaluate(&mut tx, &attempt(FirewallRule::CreateContentTextRoot, owner, now))
            .await
            .unwrap();

        assert!(!child.is_allowed());
        assert!(root.is_allowed());
    }

    #[tokio::test]
    async fn test_other_owners_are_not_counted() {
        let store = InMemoryFirewallStore::new();
        let evaluator = RateRuleEvaluator::new(FirewallConfig::default());
        let now = clock::now();
        seed(
            &store,
            &[
                content(Uuid::new_v4(), None, now),
                content(Uuid::new_v4(), None, now),
            ],
        )
        .await;

        let mut tx = store.begin().await.unwrap();
        let verdict = evaluator
            .evaluate(
                &mut tx,
                &attempt(FirewallRule::CreateContentTextRoot, Uuid::new_v4(), now),
            )
            .await
            .unwrap();

        assert!(verdict.is_allowed());
    }

    #[tokio::test]
    async fn test_disabled_rule_never_fires() {
        let store = InMemoryFirewallStore::new();
        let mut config = FirewallConfig::default();
        *config.rule_mut(FirewallRule::CreateContentTextRoot) = RuleSettings {
            enabled: false,
            threshold: 3,
            window_secs: 5,
        };
        let evaluator = RateRuleEvaluator::new(config);
        let owner = Uuid::new_v4();
        let now = clock::now();
        seed(
            &store,
            &[content(owner, None, now), content(owner, None, now)],
        )
        .await;

        let mut tx = store.begin().await.unwrap();
        let verdict = evaluator
            .evaluate(&mut tx, &attempt(FirewallRule::CreateContentTextRoot, owner, now))
            .await
            .unwrap();

        assert!(verdict.is_allowed());
    }

    #[tokio::test]
    async fn test_mismatched_identity_is_rejected() {
        let store = InMemoryFirewallStore::new();
        let evaluator = RateRuleEvaluator::new(FirewallConfig::default());
        let mut tx = store.begin().await.unwrap();

        let result = evaluator
            .evaluate(
                &mut tx,
                &CreationAttempt {
                    rule: FirewallRule::CreateContentTextRoot,
                    identity: ActorIdentity::Ip("10.1.1.1".parse().unwrap()),
                    requested_at: clock::now(),
                },
            )
            .await;

        assert!(matches!(result, Err(FirewallError::Validation(_))));
    }
}
