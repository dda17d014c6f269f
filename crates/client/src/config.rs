//! Connection configuration for the session client.

use serde_json::Value;
use std::time::Duration;

/// Errors raised while loading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Default path of the discovery call, appended to the base URL.
pub const DEFAULT_CONNECT_PATH: &str = "/connect";

/// Default bound on the discovery round trip. The protocol itself mandates no
/// timeout; an unbounded hang is strictly worse than a retryable error.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for establishing one session.
#[derive(Clone, Debug)]
pub struct ConnectConfig {
    /// Base URL of the discovery endpoint, e.g. `https://agent.example.com`.
    pub base_url: String,
    /// Path of the discovery call.
    pub connect_path: String,
    /// Optional bearer token sent with the discovery call.
    pub api_token: Option<String>,
    /// Ask the endpoint to provision a fresh room for this session.
    pub create_room: bool,
    /// Provider-specific room properties forwarded to the endpoint.
    pub room_properties: Option<Value>,
    /// Opaque application payload forwarded to the remote agent.
    pub request_data: Option<Value>,
    /// Bound on the discovery round trip.
    pub discovery_timeout: Duration,
}

impl ConnectConfig {
    /// Builds a configuration with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_path: DEFAULT_CONNECT_PATH.to_string(),
            api_token: None,
            create_room: true,
            room_properties: None,
            request_data: None,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let base_url = std::env::var("AGENT_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("AGENT_BASE_URL".to_string()))?;

        let connect_path = std::env::var("AGENT_CONNECT_PATH")
            .unwrap_or_else(|_| DEFAULT_CONNECT_PATH.to_string());

        let api_token = std::env::var("AGENT_API_TOKEN").ok();

        let discovery_timeout = match std::env::var("AGENT_CONNECT_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidValue(
                        "AGENT_CONNECT_TIMEOUT_SECS".to_string(),
                        e.to_string(),
                    )
                })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue(
                        "AGENT_CONNECT_TIMEOUT_SECS".to_string(),
                        "must be greater than zero".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            Err(_) => DEFAULT_DISCOVERY_TIMEOUT,
        };

        let request_data = match std::env::var("AGENT_REQUEST_DATA") {
            Ok(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
                ConfigError::InvalidValue("AGENT_REQUEST_DATA".to_string(), e.to_string())
            })?),
            Err(_) => None,
        };

        Ok(Self {
            base_url,
            connect_path,
            api_token,
            create_room: true,
            room_properties: None,
            request_data,
            discovery_timeout,
        })
    }

    /// Full URL of the discovery call.
    pub fn connect_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.connect_path)
    }
}
