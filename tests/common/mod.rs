//! Test utilities and mocks for Sockgate
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use sockgate::config::Config;
use sockgate::server::Server;
use sockgate::socks::Dispatcher;
use std::net::SocketAddr;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Create a pair of connected duplex streams for testing
pub fn create_mock_stream_pair() -> (DuplexStream, DuplexStream) {
    duplex(8192)
}

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Spawn an upstream that expects `ping`, answers `pong` and closes
pub async fn spawn_ping_pong_upstream() -> (SocketAddr, JoinHandle<()>) {
    let (listener, addr) = create_test_listener().await;
    let handle = tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        conn.write_all(b"pong").await.unwrap();
    });
    (addr, handle)
}

/// Get an address nothing is listening on
pub async fn closed_port_addr() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// A server running in the background
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown_tx: broadcast::Sender<bool>,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    /// Bind `config` and run it, optionally with a custom dispatcher
    pub async fn start(config: Config, dispatcher: Option<Dispatcher>) -> Self {
        let mut server = Server::bind(config).await.unwrap();
        if let Some(dispatcher) = dispatcher {
            server = server.with_dispatcher(dispatcher);
        }
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.run(shutdown_rx));
        TestServer {
            addr,
            shutdown_tx,
            handle,
        }
    }

    /// Signal shutdown and wait for the accept loop to return
    pub async fn stop(self) {
        self.shutdown_tx.send(true).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

/// Test configuration builder
pub struct TestConfigBuilder {
    auth_required: bool,
    bind: bool,
    destinations: Vec<String>,
    max_connections: usize,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            auth_required: false,
            bind: false,
            destinations: Vec::new(),
            max_connections: 16,
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set authentication required
    pub fn auth_required(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }

    /// Allow BIND requests through the rules
    pub fn allow_bind(mut self, allow: bool) -> Self {
        self.bind = allow;
        self
    }

    /// Add a destination pattern
    pub fn destination(mut self, pattern: &str) -> Self {
        self.destinations.push(pattern.to_string());
        self
    }

    /// Set the connection limit
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        let mut config = Config::default();
        config.server.bind_addr = "127.0.0.1:0".to_string();
        config.server.max_connections = self.max_connections;
        config.socks.auth_required = self.auth_required;
        if self.auth_required {
            config.socks.username = Some("testuser".to_string());
            config.socks.password = Some("testpass".to_string());
        }
        config.rules.bind = self.bind;
        config.rules.destinations = self.destinations;
        config
    }
}

/// Mock SOCKS5 handshake data
pub mod socks5_mock {
    use sockgate::socks::*;
    use std::net::SocketAddr;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a password auth method selection request
    pub fn create_auth_request_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Create an RFC 1929 username/password sub-negotiation
    pub fn create_password_auth(username: &str, password: &str) -> Vec<u8> {
        let mut msg = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
        msg.extend_from_slice(username.as_bytes());
        msg.push(password.len() as u8);
        msg.extend_from_slice(password.as_bytes());
        msg
    }

    /// Create a request with `command` to an IPv4 socket address
    pub fn create_request_ipv4(command: u8, addr: SocketAddr) -> Vec<u8> {
        let ip = match addr {
            SocketAddr::V4(v4) => v4.ip().octets(),
            SocketAddr::V6(_) => panic!("expected an IPv4 address"),
        };
        let mut cmd = vec![SOCKS5_VERSION, command, SOCKS5_RESERVED, SOCKS5_ADDR_TYPE_IPV4];
        cmd.extend_from_slice(&ip);
        cmd.extend_from_slice(&addr.port().to_be_bytes());
        cmd
    }

    /// Create a connect command to IPv4 address
    pub fn create_connect_ipv4(addr: SocketAddr) -> Vec<u8> {
        create_request_ipv4(SOCKS5_CMD_TCP_CONNECT, addr)
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// Reply frame with a zero IPv4 bind address
    pub fn reply_without_bind(code: u8) -> [u8; 10] {
        [
            SOCKS5_VERSION,
            code,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
            0,
            0,
            0,
            0,
            0,
            0,
        ]
    }
}
