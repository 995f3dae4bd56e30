//! SOCKS5 type definitions
//!
//! Defines the core types used in SOCKS5 protocol handling.

use super::consts::*;
use std::borrow::Cow;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// SOCKS5 command types
///
/// Unrecognized command bytes still decode; they surface as
/// [`Command::Unknown`] and are refused downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - wait for incoming connection
    Bind,
    /// UDP ASSOCIATE - establish UDP relay
    Associate,
    /// Any other command byte
    Unknown(u8),
}

impl Command {
    /// Convert Command to byte
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Connect => SOCKS5_CMD_TCP_CONNECT,
            Command::Bind => SOCKS5_CMD_TCP_BIND,
            Command::Associate => SOCKS5_CMD_UDP_ASSOCIATE,
            Command::Unknown(byte) => byte,
        }
    }
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Command::Connect,
            SOCKS5_CMD_TCP_BIND => Command::Bind,
            SOCKS5_CMD_UDP_ASSOCIATE => Command::Associate,
            other => Command::Unknown(other),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::Associate => write!(f, "UDP ASSOCIATE"),
            Command::Unknown(byte) => write!(f, "UNKNOWN({:#04x})", byte),
        }
    }
}

/// Destination or bound address of a SOCKS5 frame
///
/// Either a literal IP (v4 or v6) or a domain name, each with a port.
/// Domain names are kept as the raw bytes the client sent; they are only
/// turned into text for logging, rules and resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddrSpec {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name bytes with port
    Domain(Vec<u8>, u16),
}

impl AddrSpec {
    /// Create a new AddrSpec from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        AddrSpec::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a new AddrSpec from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        AddrSpec::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a new AddrSpec from a domain name and port
    pub fn domain(domain: impl Into<Vec<u8>>, port: u16) -> Self {
        AddrSpec::Domain(domain.into(), port)
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            AddrSpec::Ip(addr) => addr.port(),
            AddrSpec::Domain(_, port) => *port,
        }
    }

    /// Get the literal IP, if this is not a domain
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            AddrSpec::Ip(addr) => Some(addr.ip()),
            AddrSpec::Domain(_, _) => None,
        }
    }

    /// Get the domain name as text, if this is a domain
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD.
    pub fn fqdn(&self) -> Option<Cow<'_, str>> {
        self.fqdn_bytes().map(String::from_utf8_lossy)
    }

    /// Get the domain name exactly as it appears on the wire
    pub fn fqdn_bytes(&self) -> Option<&[u8]> {
        match self {
            AddrSpec::Ip(_) => None,
            AddrSpec::Domain(domain, _) => Some(domain),
        }
    }

    /// Get the address type byte for SOCKS5 protocol
    pub fn addr_type(&self) -> u8 {
        match self {
            AddrSpec::Ip(SocketAddr::V4(_)) => SOCKS5_ADDR_TYPE_IPV4,
            AddrSpec::Ip(SocketAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            AddrSpec::Domain(_, _) => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }
}

impl fmt::Display for AddrSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrSpec::Ip(addr) => write!(f, "{}", addr),
            AddrSpec::Domain(domain, port) => {
                write!(f, "{}:{}", String::from_utf8_lossy(domain), port)
            }
        }
    }
}

impl From<SocketAddr> for AddrSpec {
    fn from(addr: SocketAddr) -> Self {
        AddrSpec::Ip(addr)
    }
}

impl Default for AddrSpec {
    fn default() -> Self {
        AddrSpec::Ip(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
    }
}

/// A decoded SOCKS5 request
///
/// `dest_addr` is exactly what the client sent. When it names a domain,
/// the dispatcher attaches the resolved IP with [`Request::with_resolved`],
/// leaving the original name in place for logging and rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Protocol version, always 5 after decoding
    pub version: u8,
    /// Requested command
    pub command: Command,
    /// Destination as sent by the client
    pub dest_addr: AddrSpec,
    resolved: Option<IpAddr>,
}

impl Request {
    /// Create a SOCKS5 request
    pub fn new(command: Command, dest_addr: AddrSpec) -> Self {
        Request {
            version: SOCKS5_VERSION,
            command,
            dest_addr,
            resolved: None,
        }
    }

    /// Return a copy of this request carrying the resolved IP of its domain
    pub fn with_resolved(&self, ip: IpAddr) -> Self {
        Request {
            resolved: Some(ip),
            ..self.clone()
        }
    }

    /// IP resolved from the destination domain, if any
    pub fn resolved_ip(&self) -> Option<IpAddr> {
        self.resolved
    }

    /// Whether the destination still needs resolving before it can be dialed
    pub fn needs_resolve(&self) -> bool {
        matches!(self.dest_addr, AddrSpec::Domain(..)) && self.resolved.is_none()
    }

    /// Socket address to dial: the literal IP or the resolved one
    pub fn target(&self) -> Option<SocketAddr> {
        let port = self.dest_addr.port();
        match &self.dest_addr {
            AddrSpec::Ip(addr) => Some(*addr),
            AddrSpec::Domain(_, _) => self.resolved.map(|ip| SocketAddr::new(ip, port)),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.dest_addr, self.resolved) {
            (AddrSpec::Domain(domain, port), Some(ip)) => {
                let domain = String::from_utf8_lossy(domain);
                write!(f, "{} {} ({}):{}", self.command, domain, ip, port)
            }
            (dest, _) => write!(f, "{} {}", self.command, dest),
        }
    }
}
