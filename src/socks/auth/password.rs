//! Username/password sub-negotiation (RFC 1929)
//!
//! ```text
//! client: VER(1)=0x01 ULEN(1) UNAME(1..255) PLEN(1) PASSWD(1..255)
//! server: VER(1)=0x01 STATUS(1)             0x00 = success
//! ```

use crate::config::SocksConfig;
use crate::error::SocksError;
use crate::socks::consts::SOCKS5_AUTH_VERSION;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const STATUS_SUCCESS: u8 = 0x00;
const STATUS_FAILURE: u8 = 0x01;

/// Expected username and password
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Take the credentials from the `[socks]` section
    pub fn from_config(config: &SocksConfig) -> Result<Self, SocksError> {
        match (config.username.as_deref(), config.password.as_deref()) {
            (Some(username), Some(password)) => Ok(Credentials::new(username, password)),
            (None, _) => Err(SocksError::Auth("Username not configured".to_string())),
            (_, None) => Err(SocksError::Auth("Password not configured".to_string())),
        }
    }

    /// Username these credentials accept
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Run the sub-negotiation on `stream`
    ///
    /// Writes the status reply in every case where the client sent a
    /// complete message. Returns the authenticated username.
    pub async fn verify<S>(&self, stream: &mut S) -> Result<String, SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let version = stream.read_u8().await?;
        if version != SOCKS5_AUTH_VERSION {
            write_status(stream, STATUS_FAILURE).await?;
            return Err(SocksError::Auth(format!(
                "unsupported auth sub-negotiation version: {:#04x}",
                version
            )));
        }

        let username = read_field(stream, "username").await?;
        let password = read_field(stream, "password").await?;

        let (username, password) = match (username, password) {
            (Some(username), Some(password)) => (username, password),
            (username, _) => {
                write_status(stream, STATUS_FAILURE).await?;
                let field = if username.is_none() { "username" } else { "password" };
                return Err(SocksError::Auth(format!("empty {}", field)));
            }
        };

        let username = String::from_utf8_lossy(&username).into_owned();
        if username != self.username || password != self.password.as_bytes() {
            write_status(stream, STATUS_FAILURE).await?;
            return Err(SocksError::Auth(format!(
                "invalid credentials for user {}",
                username
            )));
        }

        write_status(stream, STATUS_SUCCESS).await?;
        tracing::debug!("User {} authenticated", username);
        Ok(username)
    }
}

/// Read a length-prefixed field; `None` when the length byte is zero
async fn read_field<S>(stream: &mut S, name: &str) -> Result<Option<Vec<u8>>, SocksError>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u8().await? as usize;
    if len == 0 {
        return Ok(None);
    }

    let mut field = vec![0u8; len];
    stream
        .read_exact(&mut field)
        .await
        .map_err(|e| SocksError::Auth(format!("truncated {}: {}", name, e)))?;
    Ok(Some(field))
}

async fn write_status<S: AsyncWrite + Unpin>(stream: &mut S, status: u8) -> Result<(), SocksError> {
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}
