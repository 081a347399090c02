//! Configuration management for the transport service.
//!
//! Configuration is layered with figment: built-in defaults, then a TOML
//! file, then `TRANSPORT_` environment variables (`__` separates sections,
//! e.g. `TRANSPORT_MAIL__HOST`). It is read once at startup and handed to the
//! components that need it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file, relative to the working directory.
const CONFIG_FILE_NAME: &str = "transport.toml";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "TRANSPORT_";

/// Two weeks, the usual session cookie lifetime.
const DEFAULT_SESSION_TTL_SECS: u64 = 14 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Directory that generated card images are written under.
    pub media_root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    /// Mark the session cookie `Secure` (only sent over HTTPS).
    pub cookie_secure: bool,
}

/// Which mail transport the notification dispatcher uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailBackend {
    #[default]
    Smtp,
    /// Keep messages in memory and log them. For local runs.
    Memory,
}

/// Outgoing mail settings, including the fixed sender address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub backend: MailBackend,
    pub host: String,
    pub port: u16,
    pub starttls: bool,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("transport.db"),
            media_root: PathBuf::from("media"),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            cookie_secure: false,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            backend: MailBackend::Smtp,
            host: "localhost".to_string(),
            port: 25,
            starttls: false,
            username: String::new(),
            password: String::new(),
            from_address: "transport@localhost".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Config {
    /// Loads configuration from `transport.toml` and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the given file (or the default one) and the
    /// environment. A missing file is not an error.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.ttl_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "session.ttl_secs must be greater than 0".to_string(),
            });
        }

        if self.mail.from_address.parse::<lettre::Address>().is_err() {
            return Err(Error::ConfigValidation {
                message: format!(
                    "mail.from_address {:?} is not a valid email address",
                    self.mail.from_address
                ),
            });
        }

        if self.mail.backend == MailBackend::Smtp && self.mail.host.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "mail.host is required for the smtp backend".to_string(),
            });
        }

        self.server.socket_addr()?;
        Ok(())
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| Error::ConfigValidation {
                message: format!("invalid listen address {}:{}", self.host, self.port),
            })
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
