// SQLite persistence.

pub mod sqlite_firewall_store;

pub use sqlite_firewall_store::{SqliteFirewallStore, SqliteFirewallTx};
