use std::{fmt, time::Duration};

use serde::Deserialize;

/// Connection and sender settings for [`crate::SmtpDispatcher`].
///
/// Every field has a default, so an empty table deserializes to a Gmail relay over STARTTLS
/// with no credentials.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Relay hostname.
    pub host: String,
    /// Relay port. 587 for STARTTLS.
    pub port: u16,
    /// Login name. Also used as the sender address when `from_address` is not set.
    pub username: Option<String>,
    /// Login password. Never printed.
    pub password: Option<String>,
    /// Sender address.
    pub from_address: Option<String>,
    /// Display name shown next to the sender address.
    pub from_name: Option<String>,
    /// Upgrade the connection with STARTTLS.
    pub use_tls: bool,
    /// How long a single send may take, in seconds. Zero disables the limit.
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_owned(),
            port: 587,
            username: None,
            password: None,
            from_address: None,
            from_name: None,
            use_tls: true,
            timeout_secs: 30,
        }
    }
}

impl SmtpConfig {
    /// The address mail is sent from.
    pub fn sender(&self) -> Option<&str> {
        let present = |address: &&str| !address.trim().is_empty();
        self.from_address
            .as_deref()
            .filter(present)
            .or_else(|| self.username.as_deref().filter(present))
    }

    /// The per-send time limit, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .field("use_tls", &self.use_tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_to_gmail_starttls() {
        let config: SmtpConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SmtpConfig::default());
        assert_eq!(config.host, "smtp.gmail.com");
        assert_eq!(config.port, 587);
        assert!(config.use_tls);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.sender(), None);
    }

    #[test]
    fn sender_falls_back_to_username() {
        let mut config = SmtpConfig {
            username: Some("me@gmail.com".to_owned()),
            ..Default::default()
        };
        assert_eq!(config.sender(), Some("me@gmail.com"));

        config.from_address = Some("noreply@example.com".to_owned());
        assert_eq!(config.sender(), Some("noreply@example.com"));
    }

    #[test]
    fn blank_from_address_falls_back_to_username() {
        let mut config = SmtpConfig {
            username: Some("me@gmail.com".to_owned()),
            from_address: Some("  ".to_owned()),
            ..Default::default()
        };
        assert_eq!(config.sender(), Some("me@gmail.com"));

        config.username = Some(String::new());
        assert_eq!(config.sender(), None);
    }

    #[test]
    fn zero_timeout_disables_the_limit() {
        let config = SmtpConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn debug_does_not_leak_password() {
        let config = SmtpConfig {
            username: Some("user".to_owned()),
            password: Some("super-secret-password".to_owned()),
            ..Default::default()
        };

        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-password"));
        assert!(debug.contains("[REDACTED]"));
    }
}
