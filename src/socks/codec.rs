//! SOCKS5 request/reply codec
//!
//! Requests and replies share one layout; only the second byte changes
//! meaning (command vs. reply code):
//!
//! ```text
//! +----+---------+-------+------+----------+----------+
//! |VER | CMD/REP |  RSV  | ATYP |   ADDR   |   PORT   |
//! +----+---------+-------+------+----------+----------+
//! | 1  |    1    | X'00' |  1   | Variable |    2     |
//! +----+---------+-------+------+----------+----------+
//! ```

use crate::error::{ReplyCode, SocksError};
use crate::socks::consts::*;
use crate::socks::types::{AddrSpec, Command, Request};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read exactly `buf.len()` bytes, turning a short read into a framing error
async fn read_field<R>(reader: &mut R, buf: &mut [u8], field: &str) -> Result<(), SocksError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(SocksError::Protocol(
            format!("short read while reading {}", field),
        )),
        Err(e) => Err(SocksError::Io(e)),
    }
}

/// Decode a SOCKS5 request from the stream
///
/// Nothing is written to the stream; on error the caller is expected to
/// drop the connection. An unrecognized command byte still decodes as
/// [`Command::Unknown`].
pub async fn read_request<R>(reader: &mut R) -> Result<Request, SocksError>
where
    R: AsyncRead + Unpin,
{
    // Read: VER CMD RSV ATYP
    let mut header = [0u8; 4];
    read_field(reader, &mut header, "request header").await?;

    let version = header[0];
    let command = Command::from(header[1]);
    let addr_type = header[3];

    if version != SOCKS5_VERSION {
        return Err(SocksError::Protocol(format!(
            "unsupported SOCKS version: {}",
            version
        )));
    }

    let dest_addr = read_addr_spec(reader, addr_type).await?;

    tracing::debug!("Decoded SOCKS5 request: {} {}", command, dest_addr);

    Ok(Request::new(command, dest_addr))
}

/// Decode the ADDR and PORT fields for the given address type
pub async fn read_addr_spec<R>(reader: &mut R, addr_type: u8) -> Result<AddrSpec, SocksError>
where
    R: AsyncRead + Unpin,
{
    let spec = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            read_field(reader, &mut addr, "IPv4 address").await?;
            let port = read_port(reader).await?;
            AddrSpec::ipv4(Ipv4Addr::from(addr), port)
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len_buf = [0u8; 1];
            read_field(reader, &mut len_buf, "domain length").await?;

            // Taken as-is; the resolver decides what a usable name is
            let mut domain = vec![0u8; len_buf[0] as usize];
            read_field(reader, &mut domain, "domain name").await?;

            let port = read_port(reader).await?;
            AddrSpec::Domain(domain, port)
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            read_field(reader, &mut addr, "IPv6 address").await?;
            let port = read_port(reader).await?;
            AddrSpec::ipv6(Ipv6Addr::from(addr), port)
        }

        other => return Err(SocksError::UnsupportedAddressType(other)),
    };

    Ok(spec)
}

async fn read_port<R>(reader: &mut R) -> Result<u16, SocksError>
where
    R: AsyncRead + Unpin,
{
    let mut port_buf = [0u8; 2];
    read_field(reader, &mut port_buf, "port").await?;
    Ok(u16::from_be_bytes(port_buf))
}

/// Append ATYP, ADDR and PORT for `addr` to `buf`
///
/// Fails without touching `buf` when a domain name does not fit the
/// one-byte length field.
pub fn encode_addr_spec(buf: &mut Vec<u8>, addr: &AddrSpec) -> Result<(), SocksError> {
    if let AddrSpec::Domain(domain, _) = addr {
        if domain.len() > MAX_DOMAIN_LEN {
            return Err(SocksError::Protocol(format!(
                "domain name is {} bytes, at most {} fit in a frame",
                domain.len(),
                MAX_DOMAIN_LEN
            )));
        }
    }

    buf.push(addr.addr_type());
    match addr {
        AddrSpec::Ip(SocketAddr::V4(v4)) => buf.extend_from_slice(&v4.ip().octets()),
        AddrSpec::Ip(SocketAddr::V6(v6)) => buf.extend_from_slice(&v6.ip().octets()),
        AddrSpec::Domain(domain, _) => {
            buf.push(domain.len() as u8);
            buf.extend_from_slice(domain);
        }
    }
    buf.extend_from_slice(&addr.port().to_be_bytes());
    Ok(())
}

/// Encode a request frame, the mirror of [`read_request`]
pub fn encode_request(request: &Request) -> Result<Vec<u8>, SocksError> {
    let mut buf = vec![request.version, request.command.to_byte(), SOCKS5_RESERVED];
    encode_addr_spec(&mut buf, &request.dest_addr)?;
    Ok(buf)
}

/// Encode a reply frame
///
/// A missing bound address is sent as IPv4 `0.0.0.0:0`.
pub fn encode_reply(code: ReplyCode, bind_addr: Option<&AddrSpec>) -> Result<Vec<u8>, SocksError> {
    let zero = AddrSpec::default();
    let bind_addr = bind_addr.unwrap_or(&zero);

    let mut buf = vec![SOCKS5_VERSION, code.into(), SOCKS5_RESERVED];
    encode_addr_spec(&mut buf, bind_addr)?;
    Ok(buf)
}

/// Write a request frame to the stream
pub async fn write_request<W>(writer: &mut W, request: &Request) -> Result<(), SocksError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_request(request)?).await?;
    writer.flush().await?;
    Ok(())
}

/// Write a reply frame to the stream
pub async fn write_reply<W>(
    writer: &mut W,
    code: ReplyCode,
    bind_addr: Option<&AddrSpec>,
) -> Result<(), SocksError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_reply(code, bind_addr)?).await?;
    writer.flush().await?;
    Ok(())
}
