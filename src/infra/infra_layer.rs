// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "memory/mod.rs"]
pub mod memory;

#[path = "sqlite/mod.rs"]
pub mod sqlite;

#[path = "mail/mod.rs"]
pub mod mail;
