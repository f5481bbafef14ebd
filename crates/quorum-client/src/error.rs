//! Client error taxonomy
//!
//! Transport and protocol failures tear down the current connection and are
//! retried by the supervisor; callers only ever see them as a single
//! connection-closed completion. Server error codes decode into
//! [`ServerError`] and go straight back to the caller without touching the
//! connection.

use quorum_protocol::ProtocolError;
use thiserror::Error;

/// Typed server error codes returned on per-operation replies
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerError {
    /// Generic API error
    #[error("api error")]
    Api,

    /// Node does not exist
    #[error("node does not exist")]
    NoNode,

    /// Caller is not authenticated
    #[error("not authenticated")]
    NoAuth,

    /// Version precondition failed
    #[error("version conflict")]
    BadVersion,

    /// Ephemeral nodes may not have children
    #[error("ephemeral nodes may not have children")]
    NoChildrenForEphemerals,

    /// Node already exists
    #[error("node already exists")]
    NodeExists,

    /// Node still has children
    #[error("node has children")]
    NotEmpty,

    /// Session was expired by the server
    #[error("session expired by the server")]
    SessionExpired,

    /// Invalid callback
    #[error("invalid callback")]
    InvalidCallback,

    /// Invalid ACL specified
    #[error("invalid ACL specified")]
    InvalidAcl,

    /// Client authentication failed
    #[error("client authentication failed")]
    AuthFailed,

    /// Server is shutting down
    #[error("server is closing")]
    Closing,

    /// No server responses to process
    #[error("no server responses to process")]
    Nothing,

    /// Session moved to another server
    #[error("session moved to another server, operation ignored")]
    SessionMoved,

    /// Error code with no known mapping
    #[error("server error code {0}")]
    Unknown(i32),
}

impl ServerError {
    /// Map a wire error code to a typed error; zero means success
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => None,
            -100 => Some(Self::Api),
            -101 => Some(Self::NoNode),
            -102 => Some(Self::NoAuth),
            -103 => Some(Self::BadVersion),
            -108 => Some(Self::NoChildrenForEphemerals),
            -110 => Some(Self::NodeExists),
            -111 => Some(Self::NotEmpty),
            -112 => Some(Self::SessionExpired),
            -113 => Some(Self::InvalidCallback),
            -114 => Some(Self::InvalidAcl),
            -115 => Some(Self::AuthFailed),
            -116 => Some(Self::Closing),
            -117 => Some(Self::Nothing),
            -118 => Some(Self::SessionMoved),
            other => Some(Self::Unknown(other)),
        }
    }
}

/// Top-level error type for client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Every address in the server list failed in one pass
    #[error("all servers unreachable")]
    AllServersUnreachable,

    /// The connection carrying this request was torn down
    #[error("connection closed")]
    ConnectionClosed,

    /// The client is shutting down
    #[error("client is closing")]
    Closing,

    /// The session identity is no longer valid
    #[error("session expired")]
    SessionExpired,

    /// A bounded read or write did not finish in time
    #[error("{0} deadline exceeded")]
    Deadline(&'static str),

    /// Reply body did not match the pending request
    #[error("mismatched response body for request")]
    UnexpectedResponse,

    /// Server rejected the operation
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// Malformed frame or field
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
