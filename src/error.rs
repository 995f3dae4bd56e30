//! Error types for Sockgate
//!
//! This module defines the request-level error taxonomy and the SOCKS5
//! reply codes those errors are reported with.

use std::io;
use thiserror::Error;

/// Errors produced while serving a single SOCKS5 request
#[derive(Error, Debug)]
pub enum SocksError {
    /// Malformed or short wire data; no reply is written
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// ATYP outside of {IPv4, FQDN, IPv6}; no reply is written
    #[error("Address type not supported: {0}")]
    UnsupportedAddressType(u8),

    /// Hostname could not be resolved
    #[error("Failed to resolve destination {host}: {reason}")]
    Resolution {
        /// The hostname that failed to resolve
        host: String,
        /// Resolver supplied reason
        reason: String,
    },

    /// Request denied by the rule set
    #[error("{command} to {dest} blocked by rules")]
    RuleDenied {
        /// Command that was denied
        command: String,
        /// Destination that was denied
        dest: String,
    },

    /// Upstream dial failed
    #[error("Connect to {dest} failed: {source}")]
    Dial {
        /// Destination that was dialed
        dest: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Command was authorized but cannot be executed
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Method negotiation or credential check failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A deadline elapsed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The request's context was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// IO error on the client stream
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SocksError {
    /// Whether this error was raised after a reply frame went out on the wire
    ///
    /// Framing errors precede any reply; decision and dial failures always
    /// write one before being returned.
    pub fn reply_sent(&self) -> bool {
        matches!(
            self,
            SocksError::Resolution { .. }
                | SocksError::RuleDenied { .. }
                | SocksError::Dial { .. }
                | SocksError::CommandNotSupported(_)
        )
    }
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    RuleFailure = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddrTypeNotSupported = 0x08,
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = SocksError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReplyCode::Succeeded),
            0x01 => Ok(ReplyCode::GeneralFailure),
            0x02 => Ok(ReplyCode::RuleFailure),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::CommandNotSupported),
            0x08 => Ok(ReplyCode::AddrTypeNotSupported),
            other => Err(SocksError::Protocol(format!("unknown reply code {}", other))),
        }
    }
}

impl From<&io::Error> for ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
            io::ErrorKind::HostUnreachable => ReplyCode::HostUnreachable,
            io::ErrorKind::TimedOut => ReplyCode::HostUnreachable,
            _ => ReplyCode::GeneralFailure,
        }
    }
}
