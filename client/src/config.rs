//! Configuration management for the client.

use std::env;
use std::fmt;
use std::time::Duration;

/// Largest page the list endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Client configuration, built in code or loaded from environment variables.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the BaaS, without a trailing slash
    pub base_url: String,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// Records requested per page when fetching a collection
    pub page_size: u32,
    /// First delay before reconnecting the realtime stream
    pub reconnect_delay: Duration,
    /// Upper bound for the reconnect delay
    pub max_reconnect_delay: Duration,
    /// How long to wait for a TCP connection and for the realtime handshake
    pub connect_timeout: Duration,
    /// Deadline for list and topic requests
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            page_size: 200,
            reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("ROOST_BASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingBaseUrl)?;
        let mut config = Self::new(base_url.trim());

        config.auth_token = lookup("ROOST_AUTH_TOKEN").filter(|token| !token.is_empty());

        if let Some(size) = number(&lookup, "ROOST_PAGE_SIZE")? {
            if size == 0 || size > MAX_PAGE_SIZE as u64 {
                return Err(ConfigError::InvalidNumber {
                    var: "ROOST_PAGE_SIZE",
                });
            }
            config.page_size = size as u32;
        }

        if let Some(ms) = number(&lookup, "ROOST_RECONNECT_DELAY_MS")? {
            config.reconnect_delay = Duration::from_millis(ms);
        }

        if let Some(ms) = number(&lookup, "ROOST_MAX_RECONNECT_DELAY_MS")? {
            config.max_reconnect_delay = Duration::from_millis(ms);
        }

        if let Some(ms) = number(&lookup, "ROOST_REQUEST_TIMEOUT_MS")? {
            if ms == 0 {
                return Err(ConfigError::InvalidNumber {
                    var: "ROOST_REQUEST_TIMEOUT_MS",
                });
            }
            config.request_timeout = Duration::from_millis(ms);
        }

        if config.max_reconnect_delay < config.reconnect_delay {
            config.max_reconnect_delay = config.reconnect_delay;
        }

        Ok(config)
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the page size, clamped to `1..=500`.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max.max(initial);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Delay before reconnect attempt `attempt` (1-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("page_size", &self.page_size)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var }),
        None => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ROOST_BASE_URL environment variable is required")]
    MissingBaseUrl,

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid {var} value")]
    InvalidNumber { var: &'static str },
}
