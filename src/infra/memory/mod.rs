// In-memory store, used by tests and local experiments.

pub mod in_memory_store;

pub use in_memory_store::{InMemoryFirewallStore, InMemoryFirewallTx};
