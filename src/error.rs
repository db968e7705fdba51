//! Unified error type. One enum, one variant group per category in the
//! error-handling taxonomy, `#[error(...)]` messages throughout, `From`
//! conversions at the I/O boundary.

use std::net::SocketAddr;

use thiserror::Error;

use crate::dns::{EncodeError, ParseError};

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    // --- Input errors (from clients; recovered locally, never fatal) ---
    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] ParseError),

    #[error("packet size {size} outside allowed bounds [{min}, {max}]")]
    OversizePacket { size: usize, min: usize, max: usize },

    #[error("invalid domain name: {0}")]
    InvalidName(String),

    #[error("too many questions: {count} (max {max})")]
    TooManyQuestions { count: usize, max: usize },

    #[error("disallowed query type: {0:?}")]
    DisallowedQueryType(crate::dns::DNSResourceType),

    // --- Upstream errors (retried, surfaced as SERVFAIL only after exhaustion) ---
    #[error("upstream {addr} timed out")]
    UpstreamTimeout { addr: SocketAddr },

    #[error("upstream {addr} refused the query")]
    UpstreamRefused { addr: SocketAddr },

    #[error("upstream {addr} returned a server error (rcode {rcode})")]
    UpstreamServerError { addr: SocketAddr, rcode: u8 },

    #[error("network error talking to upstream {addr}: {source}")]
    UpstreamNetwork {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("no healthy upstream available")]
    NoUpstreamAvailable,

    // --- Transform errors (surfaced as SERVFAIL, never cached) ---
    #[error("malformed response from upstream: {0}")]
    MalformedUpstreamResponse(ParseError),

    #[error("failed to encode response: {0}")]
    EncodeFailure(#[from] EncodeError),

    // --- Resource-limit (not a DNS error; query is silently dropped) ---
    #[error("client {addr} exceeded its rate limit")]
    RateLimited { addr: SocketAddr },

    // --- Fatal errors (terminate the process) ---
    #[error("failed to bind {addr}: {source}")]
    BindFailure {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Maps an error to the DNS rcode the resolver returns to the client,
    /// per the propagation policy in the error-handling design. Errors with
    /// no sensible rcode (fatal/resource-limit) are not meant to reach this
    /// boundary and return `None`.
    pub fn to_rcode(&self) -> Option<u8> {
        use crate::dns::message::rcode;
        match self {
            ProxyError::MalformedPacket(_)
            | ProxyError::InvalidName(_)
            | ProxyError::TooManyQuestions { .. }
            | ProxyError::DisallowedQueryType(_)
            | ProxyError::OversizePacket { .. } => Some(rcode::FORMAT_ERROR),
            ProxyError::UpstreamTimeout { .. }
            | ProxyError::UpstreamRefused { .. }
            | ProxyError::UpstreamServerError { .. }
            | ProxyError::UpstreamNetwork { .. }
            | ProxyError::NoUpstreamAvailable
            | ProxyError::MalformedUpstreamResponse(_)
            | ProxyError::EncodeFailure(_) => Some(rcode::SERVER_FAILURE),
            ProxyError::RateLimited { .. } | ProxyError::BindFailure { .. } | ProxyError::Config(_) | ProxyError::Io(_) => {
                None
            }
        }
    }
}
