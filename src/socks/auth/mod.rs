//! SOCKS5 method negotiation
//!
//! Picks an authentication method from the client's offer, runs it, and
//! produces the [`AuthContext`] handed to the request dispatcher.

mod password;

pub use password::Credentials;

use crate::config::SocksConfig;
use crate::error::SocksError;
use crate::socks::consts::*;
use crate::socks::context::{AuthContext, CTX_USERNAME};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Authentication methods the server can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication
    Password,
}

impl AuthMethod {
    /// SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }

    /// Parse a SOCKS5 method byte; `None` for methods the server cannot run
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::None),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::Password),
            _ => None,
        }
    }
}

/// Methods the server accepts, most preferred first
fn acceptable_methods(config: &SocksConfig) -> &'static [AuthMethod] {
    if config.auth_required {
        &[AuthMethod::Password]
    } else if config.has_credentials() {
        &[AuthMethod::None, AuthMethod::Password]
    } else {
        &[AuthMethod::None]
    }
}

/// Choose the first acceptable method the client offered
fn choose_method(offered: &[u8], config: &SocksConfig) -> Option<AuthMethod> {
    let offered: Vec<AuthMethod> = offered
        .iter()
        .filter_map(|b| AuthMethod::from_byte(*b))
        .collect();
    acceptable_methods(config)
        .iter()
        .copied()
        .find(|method| offered.contains(method))
}

/// Negotiate and run authentication on a fresh client connection
///
/// ```text
/// client: VER(1)=0x05 NMETHODS(1) METHODS(NMETHODS)
/// server: VER(1)=0x05 METHOD(1)            0xFF = none acceptable
/// ```
///
/// The returned context is cancelled together with `parent`. For password
/// authentication it carries the username under [`CTX_USERNAME`].
pub async fn authenticate<S>(
    stream: &mut S,
    config: &SocksConfig,
    parent: &CancellationToken,
) -> Result<AuthContext, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    let [version, count] = header;

    if version != SOCKS5_VERSION {
        return Err(SocksError::Protocol(format!(
            "unsupported SOCKS version: {}",
            version
        )));
    }
    if count == 0 {
        return Err(SocksError::Auth("client offered no methods".to_string()));
    }

    let mut offered = vec![0u8; count as usize];
    stream.read_exact(&mut offered).await?;

    let chosen = choose_method(&offered, config);
    let reply = chosen
        .map(AuthMethod::to_byte)
        .unwrap_or(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE);
    stream.write_all(&[SOCKS5_VERSION, reply]).await?;
    stream.flush().await?;

    let Some(method) = chosen else {
        return Err(SocksError::Auth(format!(
            "no acceptable method among {:02x?}",
            offered
        )));
    };

    let ctx = AuthContext::with_parent(method, parent);
    match method {
        AuthMethod::None => Ok(ctx),
        AuthMethod::Password => {
            let username = Credentials::from_config(config)?.verify(stream).await?;
            Ok(ctx.with_value(CTX_USERNAME, username))
        }
    }
}
