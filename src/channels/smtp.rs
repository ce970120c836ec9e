//! SMTP outbox via lettre.

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use crate::channels::{OutboundMessage, Outbox};
use crate::config::SmtpConfig;
use crate::error::DeliveryError;

/// Submission port that expects STARTTLS rather than implicit TLS.
const SUBMISSION_PORT: u16 = 587;

/// Authenticated SMTP relay.
pub struct SmtpOutbox {
    transport: SmtpTransport,
    host: String,
}

impl SmtpOutbox {
    /// Build the relay transport. No connection is made until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let builder = if config.port == SUBMISSION_PORT {
            SmtpTransport::starttls_relay(&config.host)
        } else {
            SmtpTransport::relay(&config.host)
        }
        .map_err(|e| DeliveryError::Transport(format!("SMTP relay error: {e}")))?;

        let transport = builder.port(config.port).credentials(creds).build();

        Ok(Self {
            transport,
            host: config.host.clone(),
        })
    }
}

impl Outbox for SmtpOutbox {
    fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let email = build_email(message)?;
        self.transport
            .send(&email)
            .map_err(|e| DeliveryError::Transport(format!("SMTP send failed: {e}")))?;
        info!(to = %message.to, host = %self.host, "Email sent");
        Ok(())
    }
}

/// Build a plain-text RFC 5322 message.
pub fn build_email(message: &OutboundMessage) -> Result<Message, DeliveryError> {
    let from: Mailbox = message
        .from
        .parse()
        .map_err(|e| DeliveryError::InvalidAddress {
            field: "from".into(),
            reason: format!("{}: {e}", message.from),
        })?;
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|e| DeliveryError::InvalidAddress {
            field: "to".into(),
            reason: format!("{}: {e}", message.to),
        })?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .map_err(|e| DeliveryError::Build(e.to_string()))
}
