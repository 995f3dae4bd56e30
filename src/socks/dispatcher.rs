//! SOCKS5 request dispatcher
//!
//! Drives one request through decode, resolve, authorize, execute, reply and
//! relay. Every failure after the request is decoded produces a reply frame
//! before the error is returned, so an `Err` does not mean nothing was
//! written to the client.

use crate::error::{ReplyCode, SocksError};
use crate::socks::codec::{read_request, write_reply};
use crate::socks::context::{AuthContext, CTX_RULE, CTX_USERNAME};
use crate::socks::dial::Dialer;
use crate::socks::relay::relay;
use crate::socks::resolver::Resolver;
use crate::socks::rules::RuleSet;
use crate::socks::types::{AddrSpec, Command, Request};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

/// Per-request state machine shared by all connections
///
/// Holds the injected collaborators; cloning is cheap.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    rules: Arc<dyn RuleSet>,
    resolver: Arc<dyn Resolver>,
    dialer: Dialer,
}

impl Dispatcher {
    /// Create a dispatcher with the default dialer
    pub fn new(rules: Arc<dyn RuleSet>, resolver: Arc<dyn Resolver>) -> Self {
        Dispatcher {
            rules,
            resolver,
            dialer: Dialer::default(),
        }
    }

    /// Replace the dialer used for CONNECT
    pub fn with_dialer(mut self, dialer: Dialer) -> Self {
        self.dialer = dialer;
        self
    }

    /// Rule set in effect
    pub fn rules(&self) -> &Arc<dyn RuleSet> {
        &self.rules
    }

    /// Decode a request from `conn` and handle it
    ///
    /// Framing errors are returned without writing anything.
    pub async fn serve<S>(&self, ctx: AuthContext, mut conn: S) -> Result<(), SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let req = read_request(&mut conn).await?;
        self.handle_request(ctx, req, conn).await
    }

    /// Handle an already decoded request on `conn`
    ///
    /// `conn` is not read while the destination is resolved and dialed, so a
    /// client that hangs up meanwhile goes unnoticed until the lookup ends
    /// (`resolve_timeout`), the dial ends (`connect_timeout`) or `ctx` is
    /// cancelled by shutdown.
    pub async fn handle_request<S>(
        &self,
        ctx: AuthContext,
        req: Request,
        mut conn: S,
    ) -> Result<(), SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        // Resolving
        let name = req.dest_addr.fqdn().map(Cow::into_owned);
        let (ctx, req) = match name {
            Some(name) => match self.resolver.resolve(ctx, &name).await {
                Ok((ctx, ip)) => (ctx, req.with_resolved(ip)),
                Err(SocksError::Cancelled) => return Err(SocksError::Cancelled),
                Err(e) => {
                    warn!("Failed to resolve {}: {}", name, e);
                    write_reply(&mut conn, ReplyCode::HostUnreachable, None).await?;
                    return Err(match e {
                        SocksError::Resolution { .. } => e,
                        other => SocksError::Resolution {
                            host: name,
                            reason: other.to_string(),
                        },
                    });
                }
            },
            None => (ctx, req),
        };

        // Authorizing
        let (ctx, allowed) = self.rules.allow(ctx, &req);
        if !allowed {
            warn!(
                user = ctx.value(CTX_USERNAME),
                rule = ctx.value(CTX_RULE),
                "SOCKS5 {} blocked by rules",
                req
            );
            write_reply(&mut conn, ReplyCode::RuleFailure, None).await?;
            return Err(SocksError::RuleDenied {
                command: req.command.to_string(),
                dest: req.dest_addr.to_string(),
            });
        }

        debug!(
            user = ctx.value(CTX_USERNAME),
            rule = ctx.value(CTX_RULE),
            "SOCKS5 {} allowed",
            req
        );

        // Executing
        match req.command {
            Command::Connect => self.handle_connect(ctx, req, conn).await,
            other => {
                warn!("{} command not supported", other);
                write_reply(&mut conn, ReplyCode::CommandNotSupported, None).await?;
                Err(SocksError::CommandNotSupported(other.to_byte()))
            }
        }
    }

    async fn handle_connect<S>(
        &self,
        ctx: AuthContext,
        req: Request,
        mut conn: S,
    ) -> Result<(), SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let Some(target) = req.target() else {
            write_reply(&mut conn, ReplyCode::GeneralFailure, None).await?;
            return Err(SocksError::Protocol(format!(
                "destination {} has no address",
                req.dest_addr
            )));
        };

        let upstream = match self.dialer.connect(&ctx, target).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to connect to {}: {}", req.dest_addr, e);
                write_reply(&mut conn, ReplyCode::from(&e), None).await?;
                return Err(SocksError::Dial {
                    dest: req.dest_addr.to_string(),
                    source: e,
                });
            }
        };

        // Replying
        let bind_addr = upstream.local_addr().ok().map(AddrSpec::from);
        write_reply(&mut conn, ReplyCode::Succeeded, bind_addr.as_ref()).await?;

        info!("SOCKS5 tunnel established: {}", req);

        // Relaying
        if let Err(e) = relay(conn, upstream, &ctx).await {
            debug!("Relay for {} ended with error: {}", req, e);
        }

        debug!("SOCKS5 tunnel closed: {}", req);
        Ok(())
    }
}
