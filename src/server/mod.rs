//! Server module for Sockgate
//!
//! This module owns the TCP listener and runs one task per client
//! connection: method negotiation, request decoding under the handshake
//! deadline, then the dispatcher.

mod connection;
#[allow(clippy::module_inception)]
mod server;

pub use connection::handle_connection;
pub use server::Server;

use crate::config::Config;
use anyhow::Result;
use tokio::sync::broadcast;

/// Run the server with the given configuration until shutdown
pub async fn run_server(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let server = Server::bind(config).await?;
    server.run(shutdown_rx).await
}
