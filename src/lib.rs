//! # Sockgate - SOCKS5 Proxy Server
//!
//! Sockgate is a SOCKS5 (RFC 1928) proxy server core. It decodes client
//! requests, resolves domain names, authorizes requests against a pluggable
//! rule set, dials the destination and relays bytes in both directions.
//!
//! ## Features
//!
//! - **Wire codec**: IPv4, IPv6 and domain-name addresses, request and reply
//!   frames
//! - **Pluggable rules**: command filters, destination allow-lists and
//!   `all-of`/`any-of` composition behind the [`socks::RuleSet`] trait
//! - **Pluggable resolution**: system DNS or a static table behind the
//!   [`socks::Resolver`] trait
//! - **Username/password authentication** (RFC 1929)
//! - **Cancellation**: every request context is tied to server shutdown
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockgate::config::load_config;
//! use sockgate::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! negotiate -> decode -> resolve -> authorize -> dial -> reply -> relay
//! ```
//!
//! Only CONNECT is executed; BIND and UDP ASSOCIATE are authorized and then
//! answered with "command not supported".

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod server;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{ReplyCode, SocksError};
pub use server::{run_server, Server};

/// Version of the Sockgate library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
