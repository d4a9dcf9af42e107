// Firewall service - the entry point for creation requests.
//
// Evaluation, blocking and the allowed insert all run in one transaction.
// When a rule fires, the block is committed, the triggering request is
// rejected without being persisted, and the owners are notified in the
// background.

use super::action_executor::FirewallActionExecutor;
use super::firewall_models::{
    Actor, ActorIdentity, CreationAttempt, FirewallConfig, FirewallHit, FirewallRule, NewContent,
    NewUser, Verdict,
};
use super::firewall_store::{FirewallError, FirewallStore, FirewallTx};
use super::rule_evaluator::RateRuleEvaluator;
use crate::core::clock;
use crate::core::content::{AccountStatus, Content, ContentKind, ContentStatus, UserAccount};
use crate::core::events::{CreatedMetadata, Event, EventMetadata};
use crate::core::notifications::{FirewallNotifier, Mailer};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct FirewallService<S: FirewallStore, M: Mailer> {
    store: Arc<S>,
    evaluator: RateRuleEvaluator,
    executor: FirewallActionExecutor,
    notifier: Arc<FirewallNotifier<S, M>>,
}

impl<S: FirewallStore, M: Mailer> FirewallService<S, M> {
    pub fn new(
        store: Arc<S>,
        config: FirewallConfig,
        notifier: Arc<FirewallNotifier<S, M>>,
    ) -> Self {
        Self {
            store,
            evaluator: RateRuleEvaluator::new(config),
            executor: FirewallActionExecutor::new(),
            notifier,
        }
    }

    pub fn config(&self) -> &FirewallConfig {
        self.evaluator.config()
    }

    /// Create a root or child content unless the owner is posting too fast.
    pub async fn create_content(&self, request: NewContent) -> Result<Content, FirewallError> {
        validate_content(&request)?;
        let requested_at = clock::truncate(request.requested_at);
        let actor = Actor::user(request.owner_id, request.origin_ip);
        let kind = ContentKind::of(request.parent_id);

        let mut tx = self.store.begin().await?;

        if let Some(parent_id) = request.parent_id {
            let parent = tx.contents_by_ids(&[parent_id]).await?;
            if parent.is_empty() {
                return Err(FirewallError::NotFound(format!(
                    "parent content {}",
                    parent_id
                )));
            }
        }
        if let Some(slug) = &request.slug {
            if tx.slug_taken(request.owner_id, slug).await? {
                return Err(FirewallError::Validation(format!(
                    "Slug \"{}\" is already in use",
                    slug
                )));
            }
        }

        let attempt = CreationAttempt {
            rule: FirewallRule::for_content(kind),
            identity: ActorIdentity::User(request.owner_id),
            requested_at,
        };
        if let Verdict::Blocked(hit) = self.evaluator.evaluate(&mut tx, &attempt).await? {
            return Err(self.block(tx, hit, actor, requested_at).await);
        }

        // Time-ordered ids break created_at ties in creation order
        let content = Content {
            id: Uuid::now_v7(),
            owner_id: request.owner_id,
            parent_id: request.parent_id,
            slug: request.slug,
            title: request.title,
            status: request.status,
            created_at: requested_at,
            updated_at: requested_at,
            published_at: (request.status == ContentStatus::Published).then_some(requested_at),
            deleted_at: None,
        };
        tx.insert_content(&content).await?;
        tx.append_event(&Event::new(
            attempt.rule.creation_event_type(),
            actor.user_id,
            actor.ip,
            EventMetadata::Created(CreatedMetadata { id: content.id }),
            requested_at,
        ))
        .await?;
        tx.commit().await?;

        tracing::debug!(content_id = %content.id, owner_id = %content.owner_id, "Content created");
        Ok(content)
    }

    /// Create an account unless too many signups came from the same IP.
    pub async fn create_user(&self, request: NewUser) -> Result<UserAccount, FirewallError> {
        validate_user(&request)?;
        let requested_at = clock::truncate(request.requested_at);
        let actor = Actor::anonymous(request.origin_ip);

        let mut tx = self.store.begin().await?;

        if tx.username_taken(&request.username).await? {
            return Err(FirewallError::Validation(format!(
                "Username \"{}\" is already in use",
                request.username
            )));
        }

        let attempt = CreationAttempt {
            rule: FirewallRule::CreateUser,
            identity: ActorIdentity::Ip(request.origin_ip),
            requested_at,
        };
        if let Verdict::Blocked(hit) = self.evaluator.evaluate(&mut tx, &attempt).await? {
            return Err(self.block(tx, hit, actor, requested_at).await);
        }

        let user = UserAccount {
            id: Uuid::now_v7(),
            username: request.username,
            email: request.email,
            notifications: request.notifications,
            features: Vec::new(),
            status: AccountStatus::Inactive,
            created_at: requested_at,
            updated_at: requested_at,
        };
        tx.insert_user(&user).await?;
        tx.append_event(&Event::new(
            attempt.rule.creation_event_type(),
            actor.user_id,
            actor.ip,
            EventMetadata::Created(CreatedMetadata { id: user.id }),
            requested_at,
        ))
        .await?;
        tx.commit().await?;

        tracing::debug!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Apply and commit a block, then notify. Always yields the error the
    /// caller returns: the rate limit, or whatever stopped the block.
    async fn block(
        &self,
        mut tx: S::Tx,
        hit: FirewallHit,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> FirewallError {
        let event = match self.executor.execute(&mut tx, &hit, &actor, now).await {
            Ok(event) => event,
            Err(e) => return e,
        };
        if let Err(e) = tx.commit().await {
            return e;
        }

        let event_id = event.id;
        self.notifier.dispatch(event);

        FirewallError::RateLimitExceeded {
            rule: hit.rule,
            event_id,
        }
    }
}

fn validate_content(request: &NewContent) -> Result<(), FirewallError> {
    if !matches!(request.status, ContentStatus::Draft | ContentStatus::Published) {
        return Err(FirewallError::Validation(
            "New contents must be draft or published".to_string(),
        ));
    }
    if let Some(slug) = &request.slug {
        let valid = !slug.is_empty()
            && slug.len() <= 160
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(FirewallError::Validation(format!("Invalid slug \"{}\"", slug)));
        }
    }
    let untitled = request
        .title
        .as_deref()
        .map_or(true, |title| title.trim().is_empty());
    if request.parent_id.is_none() && untitled {
        return Err(FirewallError::Validation(
            "Root contents need a title".to_string(),
        ));
    }
    Ok(())
}

fn validate_user(request: &NewUser) -> Result<(), FirewallError> {
    let username_ok = !request.username.is_empty()
        && request.username.len() <= 30
        && request.username.chars().all(|c| c.is_ascii_alphanumeric());
    if !username_ok {
        return Err(FirewallError::Validation(format!(
            "Invalid username \"{}\"",
            request.username
        )));
    }
    if !request.email.contains('@') {
        return Err(FirewallError::Validation("Invalid email".to_string()));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
