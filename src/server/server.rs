//! Listener and accept loop
//!
//! Manages the server lifecycle: binding, connection limiting and
//! shutdown.

use super::connection::handle_connection;
use crate::config::Config;
use crate::socks::{Dialer, Dispatcher, DnsResolver};
use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Main Sockgate server
pub struct Server {
    /// Server configuration
    config: Config,
    /// Bound listener
    listener: TcpListener,
    /// Request handling shared by all connections
    dispatcher: Dispatcher,
    /// Limits concurrently served connections
    limiter: Arc<Semaphore>,
    /// Parent of every request context
    cancel: CancellationToken,
}

impl Server {
    /// Validate `config`, build the dispatcher and bind the listener
    pub async fn bind(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

        let rules = config
            .rules
            .build()
            .map_err(|e| anyhow!("Invalid rules: {}", e))?;
        let resolver = Arc::new(DnsResolver::new(Duration::from_secs(
            config.socks.resolve_timeout,
        )));
        let dispatcher =
            Dispatcher::new(rules, resolver).with_dialer(Dialer::from_config(&config.socks));

        let listener = TcpListener::bind(&config.server.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

        let limiter = Arc::new(Semaphore::new(config.server.max_connections));

        Ok(Server {
            config,
            listener,
            dispatcher,
            limiter,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the dispatcher, e.g. to install custom rules or a resolver
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accept connections until a shutdown signal arrives
    ///
    /// On shutdown the listener is dropped and every in-flight request is
    /// cancelled.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!("SOCKS5 server listening on {}", self.local_addr()?);
        info!("Max connections: {}", self.config.server.max_connections);

        let socks_config = Arc::new(self.config.socks.clone());

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                permit = self.limiter.clone().acquire_owned() => {
                    permit.context("Connection limiter closed")?
                }
            };

            let (stream, peer) = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        // Back off on fd exhaustion and similar transient errors
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
            };

            debug!("Accepted connection from {}", peer);

            let dispatcher = self.dispatcher.clone();
            let config = socks_config.clone();
            let root = self.cancel.clone();

            tokio::spawn(async move {
                let _permit = permit;
                match handle_connection(stream, peer, &dispatcher, &config, &root).await {
                    Ok(()) => debug!("Connection from {} finished", peer),
                    Err(e) if e.reply_sent() => debug!("Request from {} failed: {}", peer, e),
                    Err(e) => warn!("Connection from {} failed: {}", peer, e),
                }
            });
        }

        info!("Shutdown signal received, stopping server");
        self.cancel.cancel();
        info!("Server stopped");
        Ok(())
    }
}
