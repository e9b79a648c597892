//! Monitor Configuration
//!
//! Node endpoints, credentials and pipeline tuning knobs.
//! Values are supplied by the binary (CLI flags or environment) before the pipeline starts.

use std::fmt;
use std::time::Duration;

use alloy::transports::http::reqwest::Url;
use thiserror::Error;

/// Default location of the monitored contracts file
pub const DEFAULT_CONTRACTS_PATH: &str = "configs/contracts.json";

/// Throughput sampling window in milliseconds
pub const DEFAULT_THROUGHPUT_INTERVAL_MS: u64 = 1000;

/// Maximum number of notifications processed concurrently
pub const DEFAULT_MAX_IN_FLIGHT: usize = 512;

/// Buffer size of each output channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Timeout for a single node request in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// How long shutdown waits for in-flight work in milliseconds
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Errors raised while validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid URL for {name}: {reason}")]
    InvalidUrl { name: &'static str, reason: String },

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Basic-auth credentials attached to every node request
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for the node connection
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// WebSocket endpoint used for the pending-transaction subscription
    pub ws_endpoint: String,
    /// HTTP endpoint used for request/response calls
    pub http_endpoint: String,
    /// Optional basic-auth credentials
    pub credentials: Option<Credentials>,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl ChainConfig {
    pub fn new(ws_endpoint: impl Into<String>, http_endpoint: impl Into<String>) -> Self {
        Self {
            ws_endpoint: ws_endpoint.into(),
            http_endpoint: http_endpoint.into(),
            credentials: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Parse the WebSocket endpoint, requiring a `ws`/`wss` scheme
    pub fn ws_url(&self) -> Result<Url, ConfigError> {
        parse_url("WS_ENDPOINT", &self.ws_endpoint, &["ws", "wss"])
    }

    /// Parse the HTTP endpoint, requiring an `http`/`https` scheme
    pub fn http_url(&self) -> Result<Url, ConfigError> {
        parse_url("HTTPS_ENDPOINT", &self.http_endpoint, &["http", "https"])
    }

    /// Check that every mandatory setting is present and well-formed
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ws_url()?;
        self.http_url()?;
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "request_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_url(name: &'static str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::Missing(name));
    }

    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        name,
        reason: e.to_string(),
    })?;

    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidUrl {
            name,
            reason: format!("unsupported scheme '{}', expected one of {:?}", url.scheme(), schemes),
        });
    }

    Ok(url)
}

/// Configuration for the transaction pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Throughput sampling window in milliseconds
    pub throughput_interval_ms: u64,
    /// Maximum concurrently processed notifications
    pub max_in_flight: usize,
    /// Buffer size of each output channel
    pub channel_capacity: usize,
    /// Grace period for in-flight work on shutdown in milliseconds
    pub shutdown_grace_ms: u64,
    /// Annotate address collections with token metadata
    pub enrich_tokens: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            throughput_interval_ms: DEFAULT_THROUGHPUT_INTERVAL_MS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            enrich_tokens: true,
        }
    }
}

impl PipelineConfig {
    pub fn throughput_interval(&self) -> Duration {
        Duration::from_millis(self.throughput_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("throughput_interval_ms", self.throughput_interval_ms == 0),
            ("max_in_flight", self.max_in_flight == 0),
            ("channel_capacity", self.channel_capacity == 0),
        ];
        match zero.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((name, _)) => Err(ConfigError::InvalidValue {
                name,
                reason: "must be greater than zero".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.throughput_interval(), Duration::from_secs(1));
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.shutdown_grace(), Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS));
        assert!(config.enrich_tokens);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pipeline_config_rejects_zero_values() {
        let config = PipelineConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { name: "max_in_flight", .. })
        ));

        let config = PipelineConfig {
            throughput_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_config_interval_low_bits_zero() {
        // Would read as zero if narrowed to 32 bits
        let config = PipelineConfig {
            throughput_interval_ms: 1 << 32,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chain_config_valid() {
        let config = ChainConfig::new("wss://node.example/ws", "https://node.example/rpc");
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS));
    }

    #[test]
    fn test_chain_config_missing_endpoint() {
        let config = ChainConfig::new("", "https://node.example/rpc");
        assert!(matches!(config.validate(), Err(ConfigError::Missing("WS_ENDPOINT"))));

        let config = ChainConfig::new("ws://localhost:8546", "  ");
        assert!(matches!(config.validate(), Err(ConfigError::Missing("HTTPS_ENDPOINT"))));
    }

    #[test]
    fn test_chain_config_wrong_scheme() {
        let config = ChainConfig::new("https://node.example", "https://node.example");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("WS_ENDPOINT"));
        assert!(err.to_string().contains("https"));
    }

    #[test]
    fn test_chain_config_unparsable_url() {
        let config = ChainConfig::new("ws://localhost:8546", "not a url");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { name: "HTTPS_ENDPOINT", .. })
        ));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("alice", "hunter2");
        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
