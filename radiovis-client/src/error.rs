//! Error types for the fetch engine and the session client.
//!
//! Neither error reaches callers of the coordinator: fetch errors become
//! [`FetchEvent::Failed`](crate::FetchEvent::Failed) and session errors end
//! in [`SessionEvent::Disconnected`](radiovis_protocol::SessionEvent::Disconnected).

use std::io;

use radiovis_protocol::ProtocolError;
use thiserror::Error;

/// Image fetch errors.
#[derive(Error, Debug)]
pub enum FetchError {
    /// URL could not be parsed or has no host.
    #[error("Invalid URL {0:?}")]
    InvalidUrl(String),

    /// Only plain http is fetched directly.
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// TCP connect failed.
    #[error("Error connecting to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Connect or response deadline expired.
    #[error("Request timed out")]
    Timeout,

    /// No end of headers within the header size limit.
    #[error("Response headers too large")]
    HeadersTooLarge,

    /// Body exceeded the configured maximum.
    #[error("Response body exceeds {0} bytes")]
    BodyTooLarge(usize),

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Session connection errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// TCP connect failed.
    #[error("Error connecting to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Connect deadline expired.
    #[error("Connect timed out")]
    Timeout,

    /// Proxy refused or broke the tunnel.
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// Malformed STOMP frame from the server.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
