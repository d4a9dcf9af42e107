// HTTP layer - axum routes over the firewall core.

pub mod error;
pub mod extract;
pub mod routes;

pub use error::ApiError;
pub use extract::TrustedProxies;
pub use routes::router;

use crate::core::firewall::{FirewallConfig, FirewallService};
use crate::core::ledger::BalanceService;
use crate::core::moderation::ModerationReviewer;
use crate::core::notifications::FirewallNotifier;
use crate::infra::mail::AppMailer;
use crate::infra::sqlite::SqliteFirewallStore;
use axum::extract::FromRef;
use std::sync::Arc;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteFirewallStore>,
    pub firewall: Arc<FirewallService<SqliteFirewallStore, AppMailer>>,
    pub reviewer: Arc<ModerationReviewer<SqliteFirewallStore>>,
    pub balances: Arc<BalanceService<SqliteFirewallStore>>,
    pub trusted_proxies: TrustedProxies,
}

impl AppState {
    pub fn new(
        store: Arc<SqliteFirewallStore>,
        config: FirewallConfig,
        mailer: Arc<AppMailer>,
        trusted_proxies: TrustedProxies,
    ) -> anyhow::Result<Self> {
        let notifier = Arc::new(FirewallNotifier::new(Arc::clone(&store), mailer)?);
        Ok(Self {
            firewall: Arc::new(FirewallService::new(Arc::clone(&store), config, notifier)),
            reviewer: Arc::new(ModerationReviewer::new(Arc::clone(&store))),
            balances: Arc::new(BalanceService::new(Arc::clone(&store))),
            store,
            trusted_proxies,
        })
    }
}

impl FromRef<AppState> for TrustedProxies {
    fn from_ref(state: &AppState) -> Self {
        state.trusted_proxies.clone()
    }
}
