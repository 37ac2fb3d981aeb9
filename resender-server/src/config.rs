//! Server configuration.
//!
//! Values are layered, later sources winning:
//!
//! 1. built in defaults
//! 2. a TOML file, `resender.toml` or the path in `RESENDER_CONFIG`
//! 3. `RESENDER_*` environment variables, with `__` separating nested keys
//!    (`RESENDER_SMTP__HOST`)
//! 4. `PORT`, `EMAIL_USER` and `EMAIL_PASS`
use std::net::SocketAddr;

use chrono::TimeDelta;
use figment::{
    providers::{Env, Format, Toml},
    value::{Uncased, UncasedStr},
    Figment,
};
use resender::job::builder::interval_from_minutes;
use resender_smtp::SmtpConfig;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "resender.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("default_interval_minutes must be a positive number, got {0}")]
    InvalidInterval(f64),
    #[error("Invalid listen address {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Used when a start request has no `intervalMinutes`.
    pub default_interval_minutes: f64,
    pub smtp: SmtpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_owned(),
            port: 5000,
            default_interval_minutes: 1.0,
            smtp: SmtpConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the file named by `RESENDER_CONFIG`, falling back to `resender.toml`, and
    /// the environment. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("RESENDER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
        let config: Self = Self::figment(&path).extract().map_err(Box::new)?;
        config.default_interval()?;
        Ok(config)
    }

    pub fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RESENDER_").split("__"))
            .merge(
                Env::raw()
                    .only(&["PORT", "EMAIL_USER", "EMAIL_PASS"])
                    .map(legacy_key),
            )
    }

    pub fn default_interval(&self) -> Result<TimeDelta, ConfigError> {
        interval_from_minutes(self.default_interval_minutes)
            .filter(|interval| *interval > TimeDelta::zero())
            .ok_or(ConfigError::InvalidInterval(self.default_interval_minutes))
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

fn legacy_key(key: &UncasedStr) -> Uncased<'_> {
    match key.as_str() {
        key if key.eq_ignore_ascii_case("EMAIL_USER") => Uncased::from("smtp.username"),
        key if key.eq_ignore_ascii_case("EMAIL_PASS") => Uncased::from("smtp.password"),
        key => Uncased::from(key.to_ascii_lowercase()),
    }
}
