//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Helper module for Duration serialization as milliseconds
pub mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as milliseconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    /// Deserialize a Duration from milliseconds (u64)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Backoff settings for reconnection attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First delay
    #[serde(with = "duration_millis")]
    pub initial: Duration,

    /// Delay ceiling
    #[serde(with = "duration_millis")]
    pub max: Duration,

    /// Growth factor per attempt
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Configuration for a client session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server addresses; bare hosts get the default port appended
    pub servers: Vec<String>,

    /// Requested session timeout; the server may negotiate a different one.
    /// The negotiated value also bounds per-frame reads and writes, and
    /// half of it sets the heartbeat cadence.
    #[serde(with = "duration_millis")]
    pub session_timeout: Duration,

    /// Per-address dial timeout
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Capacity of the outbound request queue
    pub send_queue: usize,

    /// Capacity of the session event stream
    pub event_queue: usize,

    /// Backoff applied between reconnection attempts
    pub backoff: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: vec![],
            session_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(1),
            send_queue: 16,
            event_queue: 8,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for the given servers with default settings
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Override the requested session timeout
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }
}
