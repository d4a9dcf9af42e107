// Runtime configuration, read from the environment (and `.env`, loaded in main).

use crate::core::firewall::{FirewallConfig, FirewallRule};
use crate::infra::mail::{SmtpSettings, TlsMode};
use anyhow::Context;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

const DEFAULT_DATABASE_URL: &str = "data/firewall.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAIL_FROM: &str = "Content Firewall <firewall@localhost>";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Peers whose `x-forwarded-for` header is believed
    pub trusted_proxies: Vec<IpAddr>,
    pub firewall: FirewallConfig,
    /// `None` sends notices to the logging outbox
    pub smtp: Option<SmtpSettings>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let bind_addr: SocketAddr = match parse(&lookup, "BIND_ADDR")? {
            Some(addr) => addr,
            None => DEFAULT_BIND_ADDR
                .parse()
                .context("Invalid default bind address")?,
        };

        let trusted_proxies = match lookup("TRUSTED_PROXIES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(|entry| {
                    entry
                        .parse::<IpAddr>()
                        .with_context(|| format!("Invalid TRUSTED_PROXIES entry {:?}", entry))
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let mut firewall = FirewallConfig::default();
        for rule in [
            FirewallRule::CreateUser,
            FirewallRule::CreateContentTextRoot,
            FirewallRule::CreateContentTextChild,
        ] {
            let prefix = rule_env_prefix(rule);
            let settings = firewall.rule_mut(rule);
            if let Some(enabled) = parse(&lookup, &format!("{}_ENABLED", prefix))? {
                settings.enabled = enabled;
            }
            if let Some(threshold) = parse::<u32, _>(&lookup, &format!("{}_THRESHOLD", prefix))? {
                anyhow::ensure!(threshold > 0, "{}_THRESHOLD must be at least 1", prefix);
                settings.threshold = threshold;
            }
            if let Some(window) = parse(&lookup, &format!("{}_WINDOW_SECS", prefix))? {
                settings.window_secs = window;
            }
        }

        let smtp = match lookup("SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: parse(&lookup, "SMTP_PORT")?.unwrap_or(587),
                username: lookup("SMTP_USERNAME"),
                password: lookup("SMTP_PASSWORD"),
                from: lookup("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
                tls_mode: parse(&lookup, "SMTP_TLS")?.unwrap_or(TlsMode::StartTls),
                timeout_secs: parse(&lookup, "SMTP_TIMEOUT_SECS")?.unwrap_or(10),
            }),
            None => None,
        };

        Ok(Self {
            database_url,
            bind_addr,
            trusted_proxies,
            firewall,
            smtp,
        })
    }
}

/// `create:content:text_root` -> `FIREWALL_CREATE_CONTENT_TEXT_ROOT`
fn rule_env_prefix(rule: FirewallRule) -> String {
    format!(
        "FIREWALL_{}",
        rule.as_str().replace(':', "_").to_ascii_uppercase()
    )
}

fn parse<T, F>(lookup: &F, key: &str) -> anyhow::Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", key, raw, e)),
        None => Ok(None),
    }
}
