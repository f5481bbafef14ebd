//! quorum-client: session engine for the quorum coordination service
//!
//! A single long-lived, authenticated TCP session multiplexes many
//! concurrent path-based operations and one-shot change notifications over
//! one ordered byte stream, with transparent failover across a server set
//! and automatic reconnection.

mod connector;
mod handshake;
mod multiplexer;
mod session;

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod state;
pub mod watch;

pub use client::Client;
pub use config::{BackoffConfig, ClientConfig};
pub use error::{ClientError, ServerError};
pub use state::{Event, SessionState};
pub use watch::{Watch, WatchKind};
