// Mail delivery implementations.

pub mod outbox_mailer;
pub mod smtp_mailer;

pub use outbox_mailer::OutboxMailer;
pub use smtp_mailer::{SmtpMailer, SmtpSettings, TlsMode};

use crate::core::notifications::{EmailMessage, Mailer, NotifyError};
use async_trait::async_trait;

/// The mailer chosen at startup.
pub enum AppMailer {
    Smtp(SmtpMailer),
    Outbox(OutboxMailer),
}

impl AppMailer {
    /// SMTP when settings are present, the logging outbox otherwise.
    pub fn from_settings(smtp: Option<&SmtpSettings>) -> anyhow::Result<Self> {
        match smtp {
            Some(settings) => Ok(AppMailer::Smtp(SmtpMailer::new(settings)?)),
            None => Ok(AppMailer::Outbox(OutboxMailer::new())),
        }
    }
}

#[async_trait]
impl Mailer for AppMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError> {
        match self {
            AppMailer::Smtp(mailer) => mailer.send(message).await,
            AppMailer::Outbox(mailer) => mailer.send(message).await,
        }
    }
}
