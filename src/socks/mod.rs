//! SOCKS5 module for Sockgate
//!
//! This module implements the request half of SOCKS5: the wire codec, the
//! rule set and resolver seams, and the dispatcher that ties them to an
//! upstream dial and byte relay. Method negotiation lives in [`auth`].

pub mod auth;
mod codec;
mod consts;
mod context;
mod dial;
mod dispatcher;
mod relay;
pub mod resolver;
pub mod rules;
mod types;

pub use auth::{authenticate, AuthMethod, Credentials};
pub use codec::{
    encode_addr_spec, encode_reply, encode_request, read_addr_spec, read_request, write_reply,
    write_request,
};
pub use consts::*;
pub use context::{AuthContext, CTX_RESOLVED, CTX_RULE, CTX_USERNAME};
pub use dial::{Dialer, SocketOpts};
pub use dispatcher::Dispatcher;
pub use relay::{relay, CloseOnce};
pub use resolver::{DnsResolver, Resolver, StaticResolver};
pub use rules::{
    AllOf, AnyOf, DestinationPattern, PermitAll, PermitCommand, PermitDestination, PermitNone,
    RuleSet,
};
pub use types::{AddrSpec, Command, Request};
