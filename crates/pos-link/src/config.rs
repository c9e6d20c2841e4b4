//! # Link Configuration
//!
//! Sources, later wins: built-in defaults, an optional TOML file, then
//! `POS_LINK_*` environment variables.
//!
//! ```toml
//! [terminal]
//! host = "127.0.0.1"
//! port = 2448
//! keep_alive = true
//! nodelay = true
//! read_idle_timeout_secs = 0   # 0 or absent: no read timeout
//! event_capacity = 64
//!
//! [keys]
//! client_private_key = "MIGHAgEAMBMGByqGSM49..."
//! ```

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Terminal address used when nothing else is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Terminal port used when nothing else is configured.
pub const DEFAULT_PORT: u16 = 2448;
/// Outcomes buffered per subscriber before the slowest one starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Environment variable names.
pub mod env {
    pub const HOST: &str = "POS_LINK_HOST";
    pub const PORT: &str = "POS_LINK_PORT";
    pub const KEEP_ALIVE: &str = "POS_LINK_KEEP_ALIVE";
    pub const READ_TIMEOUT_SECS: &str = "POS_LINK_READ_TIMEOUT_SECS";
    pub const PRIVATE_KEY: &str = "POS_LINK_PRIVATE_KEY";
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read {path}: {error}")]
    Io { path: String, error: String },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is present but unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the terminal listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for TerminalEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for TerminalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Complete link configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Terminal address.
    pub endpoint: TerminalEndpoint,
    /// Enable TCP keep-alive on the terminal socket.
    pub keep_alive: bool,
    /// Disable Nagle's algorithm so each request line leaves immediately.
    pub nodelay: bool,
    /// Drop the connection when nothing is read for this long.
    /// `None` means the read loop waits indefinitely.
    pub read_idle_timeout: Option<Duration>,
    /// Broadcast buffer for inbound outcomes.
    pub event_capacity: usize,
    /// Client private key (PKCS#8 or SEC1, PEM or bare base64).
    pub client_private_key: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: TerminalEndpoint::default(),
            keep_alive: true,
            nodelay: true,
            read_idle_timeout: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            client_private_key: None,
        }
    }
}

impl fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkConfig")
            .field("endpoint", &self.endpoint)
            .field("keep_alive", &self.keep_alive)
            .field("nodelay", &self.nodelay)
            .field("read_idle_timeout", &self.read_idle_timeout)
            .field("event_capacity", &self.event_capacity)
            .field(
                "client_private_key",
                &self.client_private_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    terminal: TerminalSection,
    #[serde(default)]
    keys: KeysSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TerminalSection {
    host: Option<String>,
    port: Option<u16>,
    keep_alive: Option<bool>,
    nodelay: Option<bool>,
    read_idle_timeout_secs: Option<u64>,
    event_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeysSection {
    client_private_key: Option<String>,
}

impl LinkConfig {
    /// Load configuration from a TOML file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string on top of the defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let defaults = Self::default();
        let t = file.terminal;
        Ok(Self {
            endpoint: TerminalEndpoint {
                host: t.host.unwrap_or(defaults.endpoint.host),
                port: t.port.unwrap_or(defaults.endpoint.port),
            },
            keep_alive: t.keep_alive.unwrap_or(defaults.keep_alive),
            nodelay: t.nodelay.unwrap_or(defaults.nodelay),
            read_idle_timeout: timeout_from_secs(t.read_idle_timeout_secs),
            event_capacity: t.event_capacity.unwrap_or(defaults.event_capacity),
            client_private_key: file.keys.client_private_key,
        })
    }

    /// Apply `POS_LINK_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(env::HOST) {
            self.endpoint.host = host;
        }
        if let Some(port) = lookup(env::PORT) {
            self.endpoint.port = parse_var(env::PORT, &port)?;
        }
        if let Some(keep_alive) = lookup(env::KEEP_ALIVE) {
            self.keep_alive = parse_var(env::KEEP_ALIVE, &keep_alive)?;
        }
        if let Some(secs) = lookup(env::READ_TIMEOUT_SECS) {
            let secs = parse_var(env::READ_TIMEOUT_SECS, &secs)?;
            self.read_idle_timeout = timeout_from_secs(Some(secs));
        }
        if let Some(key) = lookup(env::PRIVATE_KEY) {
            self.client_private_key = Some(key);
        }
        Ok(self)
    }

    /// Check the configuration can drive a link.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.host.trim().is_empty() {
            return Err(ConfigError::Invalid("terminal host is empty".to_string()));
        }
        if self.endpoint.port == 0 {
            return Err(ConfigError::Invalid("terminal port must not be 0".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1".to_string()));
        }
        match &self.client_private_key {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::Invalid(format!(
                "client private key missing (set [keys].client_private_key or {})",
                env::PRIVATE_KEY
            ))),
        }
    }
}

fn timeout_from_secs(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|s| *s > 0).map(Duration::from_secs)
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}={:?} is not valid", name, value)))
}
