//! Server configuration types
//!
//! Defines the configuration structures for the listener and the SOCKS5
//! request handling.

use super::RulesConfig;
use serde::{Deserialize, Serialize};

/// Default listen address
fn default_bind_addr() -> String {
    "127.0.0.1:1080".to_string()
}

/// Default connection limit
fn default_max_connections() -> usize {
    1024
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// SOCKS5 request handling configuration
    #[serde(default)]
    pub socks: SocksConfig,

    /// Authorization rules
    #[serde(default)]
    pub rules: RulesConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.socks.validate()?;
        self.rules.validate()
    }
}

/// Listener configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:1080")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Maximum number of connections served at once
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_connections: default_max_connections(),
        }
    }
}

impl ServerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_resolve_timeout() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_keepalive_secs() -> Option<u64> {
    Some(20)
}

fn default_keepalive_interval() -> Option<u64> {
    Some(8)
}

/// SOCKS5 request handling configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocksConfig {
    /// Enable/disable authentication
    #[serde(default)]
    pub auth_required: bool,

    /// Username for SOCKS5 auth
    #[serde(default)]
    pub username: Option<String>,

    /// Password for SOCKS5 auth
    #[serde(default)]
    pub password: Option<String>,

    /// Seconds allowed for method negotiation and request decoding
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Seconds allowed for resolving a destination name
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout: u64,

    /// Seconds allowed for connecting to the destination
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Enable TCP_NODELAY on upstream connections
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,

    /// TCP keepalive time for upstream connections
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: Option<u64>,

    /// TCP keepalive probe interval for upstream connections
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: Option<u64>,
}

impl Default for SocksConfig {
    fn default() -> Self {
        Self {
            auth_required: false,
            username: None,
            password: None,
            handshake_timeout: default_handshake_timeout(),
            resolve_timeout: default_resolve_timeout(),
            connect_timeout: default_connect_timeout(),
            tcp_nodelay: default_true(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

impl SocksConfig {
    /// Check if authentication credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_required && !self.has_credentials() {
            return Err("Authentication required but no credentials configured".to_string());
        }
        for (name, value) in [
            ("handshake_timeout", self.handshake_timeout),
            ("resolve_timeout", self.resolve_timeout),
            ("connect_timeout", self.connect_timeout),
        ] {
            if value == 0 {
                return Err(format!("{} must be greater than zero", name));
            }
        }
        Ok(())
    }
}
