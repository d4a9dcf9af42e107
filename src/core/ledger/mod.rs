// Point ledger - append-only credits and debits, summed on read.

mod balance_service;
pub mod ledger_models;

pub use balance_service::{restoration_entries, reversal_entries, BalanceService};
pub use ledger_models::*;
