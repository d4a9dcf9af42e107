// Event ledger - the append-only system of record.

pub mod event_models;

pub use event_models::*;
