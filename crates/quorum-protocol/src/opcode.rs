//! Operation codes and request-id sentinels

use std::fmt;

/// Protocol version sent in the connect request
pub const PROTOCOL_VERSION: i32 = 0;

/// Default server port appended to bare host addresses
pub const DEFAULT_PORT: u16 = 2181;

/// Length of the session secret issued by the server
pub const SECRET_LEN: usize = 16;

/// Operation code identifying a request's body layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpCode {
    /// Create a node
    Create = 1,
    /// Delete a node
    Delete = 2,
    /// Check node existence
    Exists = 3,
    /// Read node data
    GetData = 4,
    /// Write node data
    SetData = 5,
    /// Session keep-alive
    Ping = 11,
    /// List children with node metadata
    GetChildren2 = 12,
    /// Application-level session close
    Close = -11,
}

impl OpCode {
    /// Convert to the wire representation
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Convert from the wire representation
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Create),
            2 => Some(Self::Delete),
            3 => Some(Self::Exists),
            4 => Some(Self::GetData),
            5 => Some(Self::SetData),
            11 => Some(Self::Ping),
            12 => Some(Self::GetChildren2),
            -11 => Some(Self::Close),
            _ => None,
        }
    }
}

/// Client-assigned correlation id matching a request to its reply.
///
/// Positive ids correlate caller-issued operations. Two negative sentinels
/// are reserved: heartbeats and server-pushed watch events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Xid(pub i32);

impl Xid {
    /// Sentinel id for heartbeat frames
    pub const PING: Xid = Xid(-2);

    /// Sentinel id for server-pushed watch events
    pub const EVENT: Xid = Xid(-1);

    /// Get the raw id value
    pub fn as_i32(self) -> i32 {
        self.0
    }

    /// Whether this id correlates a caller-issued request
    pub fn is_reply(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xid-{}", self.0)
    }
}

impl From<i32> for Xid {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for op in [
            OpCode::Create,
            OpCode::Delete,
            OpCode::Exists,
            OpCode::GetData,
            OpCode::SetData,
            OpCode::Ping,
            OpCode::GetChildren2,
            OpCode::Close,
        ] {
            assert_eq!(OpCode::from_i32(op.as_i32()), Some(op));
        }
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(OpCode::from_i32(99), None);
    }

    #[test]
    fn test_sentinels_are_not_replies() {
        assert!(!Xid::PING.is_reply());
        assert!(!Xid::EVENT.is_reply());
        assert!(Xid(1).is_reply());
    }
}
