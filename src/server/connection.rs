//! Per-connection handling
//!
//! Runs the SOCKS5 handshake for one accepted stream and hands the decoded
//! request to the dispatcher.

use crate::config::SocksConfig;
use crate::error::SocksError;
use crate::socks::{authenticate, read_request, Dispatcher};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Serve one client connection
///
/// Method negotiation and request decoding must finish within
/// `handshake_timeout`; the dispatcher applies its own deadlines after
/// that. The request context is a child of `root`, so cancelling `root`
/// stops resolution, dialing and relaying for this connection.
pub async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    dispatcher: &Dispatcher,
    config: &SocksConfig,
    root: &CancellationToken,
) -> Result<(), SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let deadline = Duration::from_secs(config.handshake_timeout);

    let handshake = async {
        let ctx = authenticate(&mut stream, config, root).await?;
        let req = read_request(&mut stream).await?;
        Ok::<_, SocksError>((ctx, req))
    };

    let (ctx, req) = tokio::time::timeout(deadline, handshake)
        .await
        .map_err(|_| SocksError::Timeout(format!("handshake with {} timed out", peer)))??;

    debug!("{} requested {}", peer, req);

    dispatcher.handle_request(ctx, req, stream).await
}
