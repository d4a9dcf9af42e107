// Firewall notifier - tells owners that their items were blocked.
//
// Best-effort: every failure is logged and swallowed. The caller has already
// committed the block and answered the request by the time this runs.

use super::notification_models::{
    EmailMessage, FirewallNotice, NoticeItem, NotifyError, NotifyReport,
};
use super::templates::NoticeTemplates;
use crate::core::content::UserAccount;
use crate::core::events::{BlockTarget, Event};
use crate::core::firewall::{FirewallError, FirewallStore};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

// ============================================================================
// MAILER TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError>;
}

// ============================================================================
// NOTICE PLANNING
// ============================================================================

/// Group affected items by owner and decide who gets an email.
///
/// `affected` pairs each blocked item with its owner, in the order the event
/// lists the items. Owners appear in the result in first-appearance order.
/// Owners who opted out are dropped, and nobody is notified when the only
/// affected owner is the one whose request triggered the block.
pub fn plan_notices(
    event: &Event,
    affected: Vec<(UserAccount, NoticeItem)>,
) -> Vec<FirewallNotice> {
    let Some(rule) = event.from_rule() else {
        return Vec::new();
    };

    let mut order: Vec<Uuid> = Vec::new();
    let mut grouped: HashMap<Uuid, (UserAccount, Vec<NoticeItem>)> = HashMap::new();
    for (owner, item) in affected {
        match grouped.get_mut(&owner.id) {
            Some((_, items)) => items.push(item),
            None => {
                order.push(owner.id);
                grouped.insert(owner.id, (owner, vec![item]));
            }
        }
    }

    if order.len() == 1 && event.originator_user_id == Some(order[0]) {
        return Vec::new();
    }

    order
        .into_iter()
        .filter_map(|owner_id| grouped.remove(&owner_id))
        .filter(|(owner, _)| owner.notifications)
        .map(|(owner, items)| FirewallNotice {
            user_id: owner.id,
            username: owner.username,
            email: owner.email,
            rule,
            event_id: event.id,
            items,
        })
        .collect()
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct FirewallNotifier<S: FirewallStore, M: Mailer> {
    store: Arc<S>,
    mailer: Arc<M>,
    templates: NoticeTemplates,
}

impl<S: FirewallStore, M: Mailer> FirewallNotifier<S, M> {
    pub fn new(store: Arc<S>, mailer: Arc<M>) -> Result<Self, NotifyError> {
        Ok(Self {
            store,
            mailer,
            templates: NoticeTemplates::new()?,
        })
    }

    /// Run `notify` on a detached task.
    pub fn dispatch(self: &Arc<Self>, event: Event) -> JoinHandle<NotifyReport> {
        let notifier = Arc::clone(self);
        tokio::spawn(async move { notifier.notify(&event).await })
    }

    /// Email every affected owner of a firewall event. Never fails.
    pub async fn notify(&self, event: &Event) -> NotifyReport {
        let affected = match self.affected_owners(event).await {
            Ok(affected) => affected,
            Err(e) => {
                tracing::error!(event_id = %event.id, error = %e, "Failed to load affected owners");
                return NotifyReport::default();
            }
        };

        let owners = affected
            .iter()
            .map(|(owner, _)| owner.id)
            .collect::<HashSet<_>>()
            .len();
        let notices = plan_notices(event, affected);
        let mut report = NotifyReport {
            skipped: owners - notices.len(),
            ..Default::default()
        };

        for notice in notices {
            match self.send_notice(&notice).await {
                Ok(()) => {
                    report.sent += 1;
                    tracing::info!(
                        event_id = %event.id,
                        user_id = %notice.user_id,
                        items = notice.items.len(),
                        "Firewall notice sent"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        event_id = %event.id,
                        user_id = %notice.user_id,
                        error = %e,
                        "Firewall notice failed"
                    );
                }
            }
        }

        report
    }

    async fn send_notice(&self, notice: &FirewallNotice) -> Result<(), NotifyError> {
        let message = self.templates.render(notice)?;
        self.mailer.send(message).await
    }

    async fn affected_owners(
        &self,
        event: &Event,
    ) -> Result<Vec<(UserAccount, NoticeItem)>, NotifyError> {
        let storage = |e: FirewallError| NotifyError::StorageError(e.to_string());

        match event.target() {
            Some(BlockTarget::Contents(ids)) => {
                let contents = self.store.contents_by_ids(ids).await.map_err(storage)?;

                let mut owner_ids: Vec<Uuid> = Vec::new();
                for content in &contents {
                    if !owner_ids.contains(&content.owner_id) {
                        owner_ids.push(content.owner_id);
                    }
                }
                let owners: HashMap<Uuid, UserAccount> = self
                    .store
                    .users_by_ids(&owner_ids)
                    .await
                    .map_err(storage)?
                    .into_iter()
                    .map(|u| (u.id, u))
                    .collect();

                Ok(contents
                    .into_iter()
                    .filter_map(|content| {
                        let owner = owners.get(&content.owner_id)?.clone();
                        Some((
                            owner,
                            NoticeItem {
                                id: content.id,
                                title: content.title,
                            },
                        ))
                    })
                    .collect())
            }
            Some(BlockTarget::Users(ids)) => {
                let users = self.store.users_by_ids(ids).await.map_err(storage)?;
                Ok(users
                    .into_iter()
                    .map(|user| {
                        let item = NoticeItem {
                            id: user.id,
                            title: Some(user.username.clone()),
                        };
                        (user, item)
                    })
                    .collect())
            }
            None => Ok(Vec::new()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
