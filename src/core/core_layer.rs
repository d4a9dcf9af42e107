// The core module contains all business logic.
// Each feature gets its own submodule.

pub mod clock;

#[path = "content/mod.rs"]
pub mod content;

#[path = "events/mod.rs"]
pub mod events;

#[path = "ledger/mod.rs"]
pub mod ledger;

#[path = "firewall/mod.rs"]
pub mod firewall;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "notifications/mod.rs"]
pub mod notifications;
