//! Mail transports.

use std::sync::{Mutex, PoisonError};

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::{debug, info};

use super::OutgoingMail;
use crate::config::MailConfig;

/// Errors from composing or sending mail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailError {
    /// An address could not be parsed
    #[error("invalid email address {address:?}: {message}")]
    Address { address: String, message: String },

    /// The recipient list could not be loaded
    #[error("failed to load recipients: {message}")]
    Recipients { message: String },

    /// The message could not be assembled
    #[error("failed to build message: {message}")]
    Build { message: String },

    /// The transport refused or failed to deliver
    #[error("mail transport failed: {message}")]
    Transport { message: String },
}

/// Delivers one message to all of its recipients. Blocking.
pub trait MailTransport: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// SMTP delivery through lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer").finish_non_exhaustive()
    }
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let builder = if config.starttls {
            SmtpTransport::starttls_relay(&config.host).map_err(|e| MailError::Transport {
                message: e.to_string(),
            })?
        } else {
            SmtpTransport::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(config.timeout()));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        info!(
            "SMTP mailer configured for {}:{} (starttls={})",
            config.host, config.port, config.starttls
        );
        Ok(Self {
            transport: builder.build(),
        })
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = build_message(mail)?;
        self.transport
            .send(&message)
            .map_err(|e| MailError::Transport {
                message: e.to_string(),
            })?;
        debug!("Delivered {:?} to {} recipients", mail.subject, mail.to.len());
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        message: e.to_string(),
    })
}

/// Assembles a plain-text lettre message with every recipient on `To`.
pub fn build_message(mail: &OutgoingMail) -> Result<Message, MailError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&mail.from)?)
        .subject(mail.subject.clone())
        .header(ContentType::TEXT_PLAIN);
    for address in &mail.to {
        builder = builder.to(parse_mailbox(address)?);
    }

    builder
        .body(mail.body.clone())
        .map_err(|e| MailError::Build {
            message: e.to_string(),
        })
}

/// Keeps every message in memory. Used for local runs and tests; can be
/// told to fail every send.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    failure: Option<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent: Mutex::default(),
            failure: Some(message.into()),
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MailTransport for RecordingMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if let Some(message) = &self.failure {
            return Err(MailError::Transport {
                message: message.clone(),
            });
        }
        // Same validation a real send would do.
        build_message(mail)?;

        info!(
            "Recorded mail {:?} for {} recipients",
            mail.subject,
            mail.to.len()
        );
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mail.clone());
        Ok(())
    }
}
