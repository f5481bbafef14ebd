//! Session lifecycle states and the client-visible event stream

use std::fmt;

use quorum_protocol::{EventType, WatcherEvent};

/// Lifecycle state of the client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// State code with no known mapping
    Unknown,
    /// No live connection
    Disconnected,
    /// Dial in progress
    Connecting,
    /// TCP established, handshake not yet complete
    Connected,
    /// Handshake complete; operations flow
    HasSession,
    /// Session identity was expired by the server
    Expired,
}

impl SessionState {
    /// Convert to the wire state code
    pub fn as_code(self) -> i32 {
        match self {
            SessionState::Unknown => -1,
            SessionState::Disconnected => 0,
            SessionState::Connecting => 1,
            SessionState::Connected => 100,
            SessionState::HasSession => 101,
            SessionState::Expired => -112,
        }
    }

    /// Convert from the wire state code
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => SessionState::Disconnected,
            1 => SessionState::Connecting,
            100 => SessionState::Connected,
            101 => SessionState::HasSession,
            -112 => SessionState::Expired,
            _ => SessionState::Unknown,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unknown => "unknown",
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::HasSession => "has-session",
            SessionState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// A client-visible notification: a session lifecycle change or a watched
/// node change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What happened
    pub event_type: EventType,
    /// Session state when the event fired
    pub state: SessionState,
    /// Path of the affected node; empty for session events
    pub path: String,
}

impl Event {
    pub(crate) fn session(state: SessionState) -> Self {
        Self {
            event_type: EventType::Session,
            state,
            path: String::new(),
        }
    }

    pub(crate) fn from_wire(event: &WatcherEvent) -> Self {
        Self {
            event_type: event.event_type,
            state: SessionState::from_code(event.state),
            path: event.path.clone(),
        }
    }
}
