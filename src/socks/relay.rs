//! TCP relay for SOCKS5 CONNECT
//!
//! Copies bytes in both directions until either direction finishes, then
//! closes both write halves so the other direction stops as well.

use crate::socks::context::AuthContext;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Write half that is shut down at most once
///
/// Both relay directions may try to close the same stream; only the first
/// call reaches the underlying writer and later calls return `Ok(())`.
#[derive(Debug)]
pub struct CloseOnce<W> {
    inner: W,
    closed: bool,
}

impl<W> CloseOnce<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        CloseOnce {
            inner,
            closed: false,
        }
    }

    /// Mutable access to the writer
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shut the writer down; a no-op after the first call
    pub async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.inner.shutdown().await {
            // The peer may already have torn the connection down
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            result => result,
        }
    }
}

/// Relay data bidirectionally between the client and the upstream
///
/// Returns when either direction reaches EOF or fails, or when `ctx` is
/// cancelled. Both streams are shut down before returning. The result is
/// the error of the direction that finished first, if any.
pub async fn relay<A, B>(client: A, upstream: B, ctx: &AuthContext) -> io::Result<()>
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut client_read, client_write) = tokio::io::split(client);
    let (mut upstream_read, upstream_write) = tokio::io::split(upstream);
    let mut client_write = CloseOnce::new(client_write);
    let mut upstream_write = CloseOnce::new(upstream_write);

    let result = {
        let to_upstream = tokio::io::copy(&mut client_read, upstream_write.get_mut());
        let to_client = tokio::io::copy(&mut upstream_read, client_write.get_mut());

        tokio::select! {
            result = to_upstream => match result {
                Ok(bytes) => {
                    debug!("client->upstream finished: {} bytes", bytes);
                    Ok(())
                }
                Err(e) => {
                    debug!("client->upstream error: {}", e);
                    Err(e)
                }
            },
            result = to_client => match result {
                Ok(bytes) => {
                    debug!("upstream->client finished: {} bytes", bytes);
                    Ok(())
                }
                Err(e) => {
                    debug!("upstream->client error: {}", e);
                    Err(e)
                }
            },
            _ = ctx.cancelled() => {
                debug!("relay cancelled");
                Err(io::Error::new(io::ErrorKind::Interrupted, "relay cancelled"))
            }
        }
    };

    if let Err(e) = upstream_write.close().await {
        debug!("closing upstream failed: {}", e);
    }
    if let Err(e) = client_write.close().await {
        debug!("closing client failed: {}", e);
    }

    result
}
