// Owner notifications for firewall blocks.

mod firewall_notifier;
pub mod notification_models;
mod templates;

pub use firewall_notifier::{plan_notices, FirewallNotifier, Mailer};
pub use notification_models::*;
pub use templates::NoticeTemplates;
