//! Server-list dialing with round-robin rotation

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use quorum_protocol::DEFAULT_PORT;

use crate::error::ClientError;

/// Append the default port to bare `host` entries
pub(crate) fn normalize_servers(servers: &[String]) -> Vec<String> {
    servers
        .iter()
        .map(|server| {
            if server.contains(':') {
                server.clone()
            } else {
                format!("{server}:{DEFAULT_PORT}")
            }
        })
        .collect()
}

/// Owns the server address list and the index of the last used address
pub(crate) struct Connector {
    servers: Vec<String>,
    index: usize,
    connect_timeout: Duration,
}

impl Connector {
    pub fn new(servers: &[String], connect_timeout: Duration) -> Self {
        let servers = normalize_servers(servers);
        // Start the first pass at servers[0]
        let index = servers.len().saturating_sub(1);
        Self {
            servers,
            index,
            connect_timeout,
        }
    }

    /// Address of the last successful dial
    pub fn current(&self) -> &str {
        self.servers.get(self.index).map_or("", String::as_str)
    }

    /// One round-robin pass over the server list, starting after the last
    /// used index. Returns the first connection that succeeds; fails only
    /// after every address has been tried once. Delay-and-retry is the
    /// supervisor's job.
    pub async fn dial(&mut self) -> Result<TcpStream, ClientError> {
        let count = self.servers.len();
        if count == 0 {
            return Err(ClientError::AllServersUnreachable);
        }

        for step in 1..=count {
            let candidate = (self.index + step) % count;
            let address = &self.servers[candidate];
            match timeout(self.connect_timeout, TcpStream::connect(address.as_str())).await {
                Ok(Ok(stream)) => {
                    self.index = candidate;
                    return Ok(stream);
                }
                Ok(Err(err)) => {
                    tracing::warn!("failed to connect to {address}: {err}");
                }
                Err(_) => {
                    tracing::warn!("connection to {address} timed out");
                }
            }
        }

        Err(ClientError::AllServersUnreachable)
    }
}
