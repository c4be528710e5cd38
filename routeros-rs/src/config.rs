//! Monitor configuration, loaded from a TOML file.
//!
//! ```toml
//! address = "192.168.88.1"
//! username = "api"
//! password = "secret"
//! interfaces = ["ether1", "wlan1"]
//! interval_secs = 5
//! login = "plain"
//! ```

use std::path::Path;
use std::time::Duration;

use routeros_proto::connection::{Credentials, LoginMethod};
use routeros_tokio::{ClientConfig, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a [`MonitorConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML or does not match the expected layout.
    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
    /// A field holds an unusable value.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Login handshake, as spelled in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMode {
    /// MD5 challenge, falling back to plain when the device sends none.
    #[default]
    Challenge,
    /// Plain `/login =name= =password=`.
    Plain,
}

impl From<LoginMode> for LoginMethod {
    fn from(mode: LoginMode) -> Self {
        match mode {
            LoginMode::Challenge => LoginMethod::Challenge,
            LoginMode::Plain => LoginMethod::Plain,
        }
    }
}

/// Which device to poll, how to log in and how often.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Host name or IP address of the device.
    pub address: String,
    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// API user name.
    pub username: String,
    /// API password.
    #[serde(default)]
    pub password: String,
    /// Interfaces whose traffic is sampled.
    pub interfaces: Vec<String>,
    /// Seconds between two polls.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Login handshake.
    #[serde(default)]
    pub login: LoginMode,
    /// Upper bound for opening the TCP connection, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_interval() -> u64 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}

impl std::fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("interfaces", &self.interfaces)
            .field("interval_secs", &self.interval_secs)
            .field("login", &self.login)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl MonitorConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        raw.parse()
    }

    /// Rejects values the monitor cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "address",
                reason: "must not be empty",
            });
        }
        if self.port == 0 {
            return Err(ConfigError::Validation {
                field: "port",
                reason: "must not be 0",
            });
        }
        if self.username.is_empty() {
            return Err(ConfigError::Validation {
                field: "username",
                reason: "must not be empty",
            });
        }
        if self.interfaces.is_empty() {
            return Err(ConfigError::Validation {
                field: "interfaces",
                reason: "at least one interface is required",
            });
        }
        if self.interfaces.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::Validation {
                field: "interfaces",
                reason: "interface names must not be empty",
            });
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Validation {
                field: "interval_secs",
                reason: "must be at least 1 second",
            });
        }
        Ok(())
    }

    /// Time between two polls.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Connection settings for [`routeros_tokio::Client::connect`].
    pub fn to_client_config(&self) -> ClientConfig {
        let credentials = Credentials::new(&self.username, &self.password)
            .with_method(self.login.into());
        ClientConfig::new(&self.address, self.port, credentials)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}

impl std::str::FromStr for MonitorConfig {
    type Err = ConfigError;

    /// Parses and validates TOML text.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let config: MonitorConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }
}
