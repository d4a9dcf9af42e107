// Point ledger service - ratings, balances, and the offsetting entries the
// firewall uses to reverse and restore a content's contribution.
//
// Nothing here ever deletes an entry. Reversal inserts the opposite amount,
// restoration inserts the opposite of the reversal.

use super::ledger_models::{BalanceType, ContentContribution, LedgerEntry};
use crate::core::content::ContentStatus;
use crate::core::events::{Event, EventMetadata, EventType, PointsMetadata};
use crate::core::firewall::{Actor, FirewallError, FirewallStore, FirewallTx};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Entries that bring a content's net contribution back to zero.
///
/// Both the content's own balance and the points it earned its owner are
/// offset. Zero amounts produce no entry.
pub fn reversal_entries(
    contribution: &ContentContribution,
    originator_event_id: Uuid,
    at: DateTime<Utc>,
) -> Vec<LedgerEntry> {
    let mut entries = Vec::new();
    if contribution.content_net != 0 {
        entries.push(LedgerEntry::new(
            BalanceType::ContentPoints,
            contribution.content_id,
            -contribution.content_net,
            Some(contribution.content_id),
            originator_event_id,
            at,
        ));
    }
    if contribution.owner_net != 0 {
        entries.push(LedgerEntry::new(
            BalanceType::UserPoints,
            contribution.owner_id,
            -contribution.owner_net,
            Some(contribution.content_id),
            originator_event_id,
            at,
        ));
    }
    entries
}

/// Entries that cancel out a previous reversal.
pub fn restoration_entries(
    reversed: &[LedgerEntry],
    originator_event_id: Uuid,
    at: DateTime<Utc>,
) -> Vec<LedgerEntry> {
    reversed
        .iter()
        .filter(|e| e.amount != 0)
        .map(|e| {
            LedgerEntry::new(
                e.balance_type,
                e.recipient_id,
                -e.amount,
                e.content_id,
                originator_event_id,
                at,
            )
        })
        .collect()
}

/// Ratings and balance lookups.
pub struct BalanceService<S: FirewallStore> {
    store: Arc<S>,
}

impl<S: FirewallStore> BalanceService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Rate a published content. Books `amount` on the content and on its owner.
    pub async fn rate_content(
        &self,
        content_id: Uuid,
        rater: Actor,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<Event, FirewallError> {
        if amount == 0 {
            return Err(FirewallError::Validation(
                "Amount must not be zero".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let content = tx
            .contents_by_ids(&[content_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FirewallError::NotFound(format!("content {}", content_id)))?;

        if content.status != ContentStatus::Published {
            return Err(FirewallError::Validation(format!(
                "Content {} is {} and cannot be rated",
                content_id, content.status
            )));
        }

        let event = Event::new(
            EventType::UpdateContentPoints,
            rater.user_id,
            rater.ip,
            EventMetadata::Points(PointsMetadata { content_id, amount }),
            at,
        );
        tx.append_event(&event).await?;
        tx.insert_entry(&LedgerEntry::new(
            BalanceType::ContentPoints,
            content_id,
            amount,
            Some(content_id),
            event.id,
            at,
        ))
        .await?;
        tx.insert_entry(&LedgerEntry::new(
            BalanceType::UserPoints,
            content.owner_id,
            amount,
            Some(content_id),
            event.id,
            at,
        ))
        .await?;
        tx.commit().await?;

        tracing::debug!(
            content_id = %content_id,
            owner_id = %content.owner_id,
            amount,
            "Content rated"
        );
        Ok(event)
    }

    pub async fn balance(&self, recipient_id: Uuid) -> Result<i64, FirewallError> {
        self.store.balance(recipient_id).await
    }

    pub async fn entries(&self, recipient_id: Uuid) -> Result<Vec<LedgerEntry>, FirewallError> {
        self.store.entries_for(recipient_id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
