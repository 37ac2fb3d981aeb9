//! A [`Dispatcher`] that delivers payloads as HTML email over SMTP.
//!
//! # Example
//!
//! ```no_run
//! use resender::prelude::*;
//! use resender_smtp::{SmtpConfig, SmtpDispatcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SmtpConfig {
//!     username: Some("me@gmail.com".to_owned()),
//!     password: Some("app-password".to_owned()),
//!     ..Default::default()
//! };
//!
//! let dispatcher = SmtpDispatcher::new(&config)?;
//! dispatcher.check_health().await?;
//!
//! let scheduler = Scheduler::new(dispatcher);
//! # Ok(())
//! # }
//! ```
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use resender::{
    dispatch::{DispatchError, DispatchResult, Dispatcher},
    job::{JobKey, Payload},
};
use tracing::instrument;

mod config;

pub use config::SmtpConfig;

/// Errors raised while configuring the dispatcher or sending a message.
#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
    /// The relay could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The relay refused or failed the message.
    #[error("send failed: {0}")]
    Send(String),
    /// The message could not be assembled.
    #[error("failed to build message: {0}")]
    Build(String),
    /// Missing or invalid settings.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The recipient or sender is not a valid address.
    #[error("invalid email address: {0}")]
    Address(String),
}

impl DispatchError for SmtpError {
    fn error_type(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Send(_) => "send",
            Self::Build(_) => "build",
            Self::Config(_) => "config",
            Self::Address(_) => "address",
        }
    }
}

/// Sends every attempt as a single part `text/html` message.
#[derive(Debug)]
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    timeout: Option<Duration>,
}

impl SmtpDispatcher {
    /// Build the transport. No connection is made until the first send or
    /// [`SmtpDispatcher::check_health`].
    ///
    /// # Errors
    ///
    /// [`SmtpError::Config`] when neither a sender address nor a username is configured,
    /// [`SmtpError::Address`] when the sender is not a valid address and
    /// [`SmtpError::Connection`] when the TLS relay cannot be set up.
    #[instrument(
        name = "smtp_dispatcher_new",
        skip(config),
        fields(host = %config.host, port = %config.port, use_tls = %config.use_tls)
    )]
    pub fn new(config: &SmtpConfig) -> Result<Self, SmtpError> {
        let sender = config.sender().ok_or_else(|| {
            SmtpError::Config("either from_address or username is required".to_owned())
        })?;
        let address = sender
            .parse::<Address>()
            .map_err(|err| SmtpError::Address(format!("{sender}: {err}")))?;
        let from = Mailbox::new(config.from_name.clone(), address);

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|err| SmtpError::Connection(err.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        } else {
            tracing::warn!("No SMTP credentials configured, sending unauthenticated");
        }

        tracing::debug!("SMTP dispatcher initialized");
        Ok(Self {
            transport: builder.build(),
            from,
            timeout: config.timeout(),
        })
    }

    /// Open a connection to the relay and say hello.
    #[instrument(name = "smtp_check_health", skip(self))]
    pub async fn check_health(&self) -> Result<(), SmtpError> {
        let reachable = self
            .transport
            .test_connection()
            .await
            .map_err(|err| SmtpError::Connection(err.to_string()))?;
        if !reachable {
            return Err(SmtpError::Connection(
                "relay did not accept the connection".to_owned(),
            ));
        }
        tracing::debug!("SMTP relay is healthy");
        Ok(())
    }

    fn message(&self, recipient: &JobKey, payload: &Payload) -> Result<Message, SmtpError> {
        let to = recipient
            .as_str()
            .parse::<Mailbox>()
            .map_err(|err| SmtpError::Address(format!("{recipient}: {err}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(payload.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(payload.content.clone())
            .map_err(|err| SmtpError::Build(err.to_string()))
    }

    #[instrument(name = "smtp_send", skip_all, fields(to = %recipient, subject = %payload.subject))]
    async fn send(&self, recipient: &JobKey, payload: &Payload) -> Result<(), SmtpError> {
        let message = self.message(recipient, payload)?;
        self.transport
            .send(message)
            .await
            .map_err(|err| SmtpError::Send(err.to_string()))?;
        tracing::debug!("Message accepted by relay");
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for SmtpDispatcher {
    async fn dispatch(&self, recipient: &JobKey, payload: &Payload) -> DispatchResult {
        match self.send(recipient, payload).await {
            Ok(()) => DispatchResult::Sent,
            Err(err) => err.into(),
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;

    fn config() -> SmtpConfig {
        SmtpConfig {
            username: Some("me@gmail.com".to_owned()),
            password: Some("secret".to_owned()),
            from_name: Some("Resender".to_owned()),
            ..Default::default()
        }
    }

    fn payload() -> Payload {
        Payload::new("Weekly update", "<h1>Hello</h1>").unwrap()
    }

    #[test]
    fn sender_is_required() {
        let config = SmtpConfig::default();
        assert_matches!(SmtpDispatcher::new(&config), Err(SmtpError::Config(_)));
    }

    #[test]
    fn invalid_sender_is_rejected() {
        let config = SmtpConfig {
            from_address: Some("not-an-address".to_owned()),
            ..config()
        };
        let err = SmtpDispatcher::new(&config).err().unwrap();
        assert_matches!(err, SmtpError::Address(_));
        assert_eq!(err.error_type(), "address");
    }

    #[tokio::test]
    async fn message_is_html_from_the_configured_sender() {
        let dispatcher = SmtpDispatcher::new(&config()).unwrap();
        let message = dispatcher
            .message(&JobKey::new("friend@example.com").unwrap(), &payload())
            .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: Resender <me@gmail.com>"));
        assert!(raw.contains("To: friend@example.com"));
        assert!(raw.contains("Subject: Weekly update"));
        assert!(raw.contains("Content-Type: text/html; charset=utf-8"));
        assert!(raw.contains("<h1>Hello</h1>"));
    }

    #[tokio::test]
    async fn invalid_recipient_fails_the_attempt() {
        let dispatcher = SmtpDispatcher::new(&config()).unwrap();
        let result = dispatcher
            .dispatch(&JobKey::new("not an address").unwrap(), &payload())
            .await;

        let DispatchResult::Failed { error } = result else {
            panic!("expected a failed dispatch");
        };
        assert_eq!(error.error_type(), "address");
    }

    #[tokio::test]
    async fn timeout_comes_from_config() {
        let dispatcher = SmtpDispatcher::new(&SmtpConfig {
            timeout_secs: 5,
            ..config()
        })
        .unwrap();
        assert_eq!(dispatcher.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn error_types() {
        assert_eq!(SmtpError::Connection(String::new()).error_type(), "connection");
        assert_eq!(SmtpError::Send(String::new()).error_type(), "send");
        assert_eq!(SmtpError::Build(String::new()).error_type(), "build");
        assert_eq!(SmtpError::Config(String::new()).error_type(), "config");
    }
}
