//! Configuration management

use crate::protocol::{
    ACCEPT_RETRY_DELAY, HANDSHAKE_TIMEOUT, HEARTBEAT_INTERVAL, RECONNECT_DELAY, REQUEST_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay server configuration
    pub server: Option<ServerConfig>,
    /// Tunnel client configuration
    pub client: Option<ClientConfig>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::Error> {
        let content = self.to_toml()?;

        std::fs::write(path, content)
            .map_err(|e| crate::Error::Config(format!("Failed to write config: {}", e)))
    }

    /// Serialize to a TOML document
    pub fn to_toml(&self) -> Result<String, crate::Error> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))
    }
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host both listeners bind to
    pub bind: String,
    /// Port tunnel clients connect to (control and data channels)
    pub bridge_port: u16,
    /// Port public users connect to
    pub public_port: u16,
    /// Shared password
    pub password: String,
    /// Seconds a bridge connection has to complete its handshake
    pub handshake_timeout_secs: u64,
    /// Seconds a public connection waits for its data channel
    pub request_timeout_secs: u64,
    /// Seconds between control channel heartbeats
    pub heartbeat_interval_secs: u64,
    /// Seconds to wait after an accept error
    pub accept_retry_secs: u64,
    /// Cap on concurrently served public connections (unset = unbounded)
    pub max_connections: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            bridge_port: 9000,
            public_port: 9001,
            password: String::new(),
            handshake_timeout_secs: HANDSHAKE_TIMEOUT.as_secs(),
            request_timeout_secs: REQUEST_TIMEOUT.as_secs(),
            heartbeat_interval_secs: HEARTBEAT_INTERVAL.as_secs(),
            accept_retry_secs: ACCEPT_RETRY_DELAY.as_secs(),
            max_connections: None,
        }
    }
}

impl ServerConfig {
    /// Bridge listen address
    pub fn bridge_addr(&self) -> String {
        format!("{}:{}", self.bind, self.bridge_port)
    }

    /// Public listen address
    pub fn public_addr(&self) -> String {
        format!("{}:{}", self.bind, self.public_port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn accept_retry(&self) -> Duration {
        Duration::from_secs(self.accept_retry_secs)
    }

    /// Check values the server cannot run without
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.password.is_empty() {
            return Err(crate::Error::Config("password must not be empty".to_string()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(crate::Error::Config(
                "heartbeat_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.max_connections == Some(0) {
            return Err(crate::Error::Config(
                "max_connections must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tunnel client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay host
    pub server_host: String,
    /// Relay bridge port
    pub server_port: u16,
    /// Host of the service being exposed
    pub target_host: String,
    /// Port of the service being exposed
    pub target_port: u16,
    /// Shared password
    pub password: String,
    /// Seconds between control channel reconnect attempts
    pub reconnect_delay_secs: u64,
    /// Seconds allowed for each outbound TCP connect
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 9000,
            target_host: "127.0.0.1".to_string(),
            target_port: 80,
            password: String::new(),
            reconnect_delay_secs: RECONNECT_DELAY.as_secs(),
            connect_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    /// Relay bridge address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Target service address
    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Check values the client cannot run without
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.password.is_empty() {
            return Err(crate::Error::Config("password must not be empty".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Generate example configuration
pub fn generate_example_config() -> Config {
    Config {
        server: Some(ServerConfig {
            password: "change-me".to_string(),
            ..ServerConfig::default()
        }),
        client: Some(ClientConfig {
            password: "change-me".to_string(),
            ..ClientConfig::default()
        }),
        logging: LoggingConfig::default(),
    }
}
