// SMTP delivery for firewall notices.

use crate::core::notifications::{EmailMessage, Mailer, NotifyError};
use async_trait::async_trait;
use lettre::message::{Mailbox, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    None,
    StartTls,
    Tls,
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(TlsMode::None),
            "starttls" => Ok(TlsMode::StartTls),
            "tls" => Ok(TlsMode::Tls),
            other => Err(format!(
                "Invalid TLS mode: {}. Must be 'none', 'starttls', or 'tls'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// `Name <address>` or a bare address
    pub from: String,
    pub tls_mode: TlsMode,
    pub timeout_secs: u64,
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> anyhow::Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid from address {}: {}", settings.from, e))?;

        let tls = match settings.tls_mode {
            TlsMode::Tls => Tls::Wrapper(TlsParameters::new(settings.host.clone())?),
            TlsMode::StartTls => Tls::Opportunistic(TlsParameters::new(settings.host.clone())?),
            TlsMode::None => Tls::None,
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            .port(settings.port)
            .timeout(Some(Duration::from_secs(settings.timeout_secs)))
            .tls(tls);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build(&self, message: &EmailMessage) -> Result<Message, NotifyError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|_| NotifyError::DeliveryError(format!("Invalid recipient {}", message.to)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .singlepart(SinglePart::plain(message.text_body.clone()))
            .map_err(|e| NotifyError::DeliveryError(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError> {
        let email = self.build(&message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::DeliveryError(format!("SMTP send failed: {}", e)))?;
        tracing::debug!(to = %message.to, "Email handed to SMTP relay");
        Ok(())
    }
}
