//! Upstream TCP dialing
//!
//! Opens the CONNECT target with a deadline and applies socket options to
//! the new stream.

use crate::config::SocksConfig;
use crate::socks::context::AuthContext;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Socket options for configuring upstream connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from the SOCKS configuration
    pub fn from_socks_config(config: &SocksConfig) -> Self {
        SocketOpts {
            nodelay: config.tcp_nodelay,
            keepalive_secs: config.keepalive_secs,
            keepalive_interval: config.keepalive_interval,
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let Some(timeout) = self.keepalive_secs {
            let socket = socket2::SockRef::from(stream);
            let mut keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(timeout));
            if let Some(interval) = self.keepalive_interval {
                keepalive = keepalive.with_interval(Duration::from_secs(interval));
            }
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Dials CONNECT targets
#[derive(Debug, Clone)]
pub struct Dialer {
    socket_opts: SocketOpts,
    connect_timeout: Duration,
}

impl Dialer {
    /// Create a dialer
    pub fn new(socket_opts: SocketOpts, connect_timeout: Duration) -> Self {
        Dialer {
            socket_opts,
            connect_timeout,
        }
    }

    /// Create a dialer from the SOCKS configuration
    pub fn from_config(config: &SocksConfig) -> Self {
        Dialer::new(
            SocketOpts::from_socks_config(config),
            Duration::from_secs(config.connect_timeout),
        )
    }

    /// Connect to `addr`
    ///
    /// A missed deadline surfaces as [`io::ErrorKind::TimedOut`] and a
    /// cancelled context as [`io::ErrorKind::Interrupted`].
    pub async fn connect(&self, ctx: &AuthContext, addr: SocketAddr) -> io::Result<TcpStream> {
        let connect = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr));

        let stream = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "request cancelled"))
            }
            result = connect => match result {
                Ok(result) => result?,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", addr),
                    ))
                }
            },
        };

        if let Err(e) = self.socket_opts.apply(&stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }

        tracing::debug!("TCP connection established to {}", addr);

        Ok(stream)
    }
}

impl Default for Dialer {
    fn default() -> Self {
        Dialer::new(SocketOpts::default(), Duration::from_secs(10))
    }
}
