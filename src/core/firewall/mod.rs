// Content firewall - rate rules that detect creation bursts and block the
// offending items.

mod action_executor;
pub mod firewall_models;
mod firewall_service;
pub mod firewall_store;
mod rule_evaluator;

pub use action_executor::FirewallActionExecutor;
pub use firewall_models::*;
pub use firewall_service::FirewallService;
pub use firewall_store::*;
pub use rule_evaluator::RateRuleEvaluator;
