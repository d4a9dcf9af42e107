// Point ledger domain models.
//
// Balances are never stored. A balance is the sum of every entry for a
// recipient, and entries are never edited or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which kind of recipient an entry is booked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalanceType {
    #[serde(rename = "content:points")]
    ContentPoints,
    #[serde(rename = "user:points")]
    UserPoints,
}

impl BalanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceType::ContentPoints => "content:points",
            BalanceType::UserPoints => "user:points",
        }
    }
}

impl fmt::Display for BalanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BalanceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content:points" => Ok(BalanceType::ContentPoints),
            "user:points" => Ok(BalanceType::UserPoints),
            other => Err(format!("unknown balance type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Credit,
    Debit,
}

/// One immutable credit or debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub balance_type: BalanceType,
    pub recipient_id: Uuid,
    /// Signed amount; negative amounts are debits
    pub amount: i64,
    /// The content this entry is attributed to, if any
    pub content_id: Option<Uuid>,
    /// The event that caused this entry
    pub originator_event_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        balance_type: BalanceType,
        recipient_id: Uuid,
        amount: i64,
        content_id: Option<Uuid>,
        originator_event_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            balance_type,
            recipient_id,
            amount,
            content_id,
            originator_event_id,
            created_at,
        }
    }

    pub fn kind(&self) -> EntryKind {
        if self.amount < 0 {
            EntryKind::Debit
        } else {
            EntryKind::Credit
        }
    }
}

/// Net points a single content has contributed, both to itself and to its
/// owner's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentContribution {
    pub content_id: Uuid,
    pub owner_id: Uuid,
    pub content_net: i64,
    pub owner_net: i64,
}
