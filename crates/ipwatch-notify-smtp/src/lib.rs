//! SMTP delivery of change alerts and digests.
//!
//! One message per recipient, so a rejected mailbox never blocks the rest of
//! the list and the outcome can be reported per recipient. The transport uses
//! implicit TLS (SMTPS) against the configured relay and never retries; a
//! failed delivery is re-attempted only when the next change occurs.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::{Category, Severity};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use ipwatch_core::Error;
use ipwatch_core::error::DeliveryError;
use ipwatch_core::traits::{
    ChangeNotification, DeliveryReport, DigestNotification, Notifier, RecipientFailure,
};

pub mod template;

/// Relay endpoint, credential pair, and addressing for outbound mail.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Relay hostname, e.g. "smtp.fastmail.com"
    pub host: String,
    /// SMTPS port, normally 465
    pub port: u16,
    /// Username for the credential pair
    pub username: String,
    /// Password for the credential pair
    pub password: String,
    /// From address on every message
    pub from: String,
    /// Recipient list
    pub recipients: Vec<String>,
}

/// Notifier that delivers rendered HTML messages over SMTPS.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<(String, Mailbox)>,
}

impl SmtpNotifier {
    /// Build a notifier from configuration.
    ///
    /// Address parsing and relay setup are validated here so a bad
    /// configuration fails at startup, not on the first change.
    pub fn new(config: &SmtpConfig) -> Result<Self, Error> {
        if config.recipients.is_empty() {
            return Err(Error::config("at least one recipient is required"));
        }

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| Error::config(format!("invalid from address '{}': {}", config.from, e)))?;

        let recipients = config
            .recipients
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map(|mailbox| (addr.clone(), mailbox))
                    .map_err(|e| Error::config(format!("invalid recipient '{}': {}", addr, e)))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| Error::config(format!("smtp relay '{}': {}", config.host, e)))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from,
            recipients,
        })
    }

    /// Deliver one rendered message to every recipient, independently.
    async fn send_to_all(&self, subject: &str, body: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for (address, mailbox) in &self.recipients {
            let message = Message::builder()
                .from(self.from.clone())
                .to(mailbox.clone())
                .subject(subject)
                .header(ContentType::TEXT_HTML)
                .body(body.to_string());

            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    report.failed.push(RecipientFailure {
                        recipient: address.clone(),
                        error: DeliveryError::Protocol(format!("message build: {}", e)),
                    });
                    continue;
                }
            };

            match self.transport.send(message).await {
                Ok(_) => {
                    info!(recipient = %address, subject, "message delivered");
                    report.delivered.push(address.clone());
                }
                Err(e) => {
                    let error = classify(&e);
                    warn!(recipient = %address, error = %error, "delivery failed");
                    report.failed.push(RecipientFailure {
                        recipient: address.clone(),
                        error,
                    });
                }
            }
        }

        report
    }
}

/// Map a lettre transport error onto the delivery taxonomy.
///
/// 53x permanent replies are the relay's authentication and policy
/// rejections; other status-bearing replies are protocol failures; anything
/// without a status never reached the SMTP conversation.
fn classify(err: &lettre::transport::smtp::Error) -> DeliveryError {
    let detail = err.to_string();
    match err.status() {
        Some(code)
            if code.severity == Severity::PermanentNegativeCompletion
                && code.category == Category::Unspecified3 =>
        {
            DeliveryError::Auth(detail)
        }
        Some(_) => DeliveryError::Protocol(detail),
        None => DeliveryError::Connection(detail),
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify_change(&self, change: &ChangeNotification) -> Result<DeliveryReport, Error> {
        let (subject, body) = template::render_change(change).map_err(Error::Delivery)?;
        Ok(self.send_to_all(&subject, &body).await)
    }

    async fn notify_digest(&self, digest: &DigestNotification) -> Result<DeliveryReport, Error> {
        let (subject, body) = template::render_digest(digest).map_err(Error::Delivery)?;
        Ok(self.send_to_all(&subject, &body).await)
    }
}
