//! Message bodies for the quorum protocol
//!
//! Every message is a closed enum variant with a hand-written encode/decode
//! pair over the flat field layouts in `wire`. Request bodies are paired
//! with their opcode; response bodies are decoded by the opcode of the
//! pending request they answer. The codec is symmetric: for every value,
//! `decode(encode(x)) == x`.

use bytes::{Buf, BufMut, BytesMut};

use crate::acl::Acl;
use crate::error::ProtocolError;
use crate::opcode::OpCode;
use crate::wire;

/// Node metadata returned alongside most responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Transaction id that created the node
    pub czxid: i64,
    /// Transaction id that last modified the node
    pub mzxid: i64,
    /// Creation time in milliseconds since the epoch
    pub ctime: i64,
    /// Last-modification time in milliseconds since the epoch
    pub mtime: i64,
    /// Number of data changes
    pub version: i32,
    /// Number of child-list changes
    pub cversion: i32,
    /// Number of ACL changes
    pub aversion: i32,
    /// Owning session id for ephemeral nodes, zero otherwise
    pub ephemeral_owner: i64,
    /// Length of the node data in bytes
    pub data_length: i32,
    /// Number of children
    pub num_children: i32,
    /// Transaction id that last modified the child list
    pub pzxid: i64,
}

impl Stat {
    /// Encode into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i64(self.czxid);
        dst.put_i64(self.mzxid);
        dst.put_i64(self.ctime);
        dst.put_i64(self.mtime);
        dst.put_i32(self.version);
        dst.put_i32(self.cversion);
        dst.put_i32(self.aversion);
        dst.put_i64(self.ephemeral_owner);
        dst.put_i32(self.data_length);
        dst.put_i32(self.num_children);
        dst.put_i64(self.pzxid);
    }

    /// Decode from a byte buffer
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(Self {
            czxid: wire::get_i64(src)?,
            mzxid: wire::get_i64(src)?,
            ctime: wire::get_i64(src)?,
            mtime: wire::get_i64(src)?,
            version: wire::get_i32(src)?,
            cversion: wire::get_i32(src)?,
            aversion: wire::get_i32(src)?,
            ephemeral_owner: wire::get_i64(src)?,
            data_length: wire::get_i32(src)?,
            num_children: wire::get_i32(src)?,
            pzxid: wire::get_i64(src)?,
        })
    }
}

/// Handshake request sent immediately after the TCP dial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Protocol version, always zero today
    pub protocol_version: i32,
    /// Highest transaction id this client has observed
    pub last_zxid_seen: i64,
    /// Requested session timeout in milliseconds
    pub timeout_ms: i32,
    /// Session id to resume, zero for a fresh session
    pub session_id: i64,
    /// Session secret; 16 zero bytes before the first handshake
    pub secret: Vec<u8>,
}

impl ConnectRequest {
    /// Encode into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i32(self.protocol_version);
        dst.put_i64(self.last_zxid_seen);
        dst.put_i32(self.timeout_ms);
        dst.put_i64(self.session_id);
        wire::put_buffer(dst, Some(&self.secret));
    }

    /// Decode from a byte buffer
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(Self {
            protocol_version: wire::get_i32(src)?,
            last_zxid_seen: wire::get_i64(src)?,
            timeout_ms: wire::get_i32(src)?,
            session_id: wire::get_i64(src)?,
            secret: wire::get_buffer(src)?.unwrap_or_default(),
        })
    }
}

/// Handshake reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Protocol version echoed by the server
    pub protocol_version: i32,
    /// Negotiated session timeout in milliseconds
    pub timeout_ms: i32,
    /// Session id; zero means the presented session has expired
    pub session_id: i64,
    /// Fresh session secret
    pub secret: Vec<u8>,
}

impl ConnectResponse {
    /// Encode into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i32(self.protocol_version);
        dst.put_i32(self.timeout_ms);
        dst.put_i64(self.session_id);
        wire::put_buffer(dst, Some(&self.secret));
    }

    /// Decode from a byte buffer
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(Self {
            protocol_version: wire::get_i32(src)?,
            timeout_ms: wire::get_i32(src)?,
            session_id: wire::get_i64(src)?,
            secret: wire::get_buffer(src)?.unwrap_or_default(),
        })
    }
}

/// Disposition of a created node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CreateMode {
    /// Node survives the creating session
    Persistent = 0,
    /// Node is deleted when the creating session ends
    Ephemeral = 1,
    /// Server appends a monotonically increasing suffix to the path
    Sequential = 2,
    /// Ephemeral with a sequential suffix
    EphemeralSequential = 3,
}

impl CreateMode {
    /// Convert to the wire representation
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Convert from the wire representation
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Persistent),
            1 => Some(Self::Ephemeral),
            2 => Some(Self::Sequential),
            3 => Some(Self::EphemeralSequential),
            _ => None,
        }
    }
}

/// Body of a caller-issued request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Check node existence, optionally arming a watch
    Exists { path: String, watch: bool },

    /// Read node data, optionally arming a watch
    GetData { path: String, watch: bool },

    /// Write node data if the version matches (-1 = any)
    SetData {
        path: String,
        data: Option<Vec<u8>>,
        version: i32,
    },

    /// List children, optionally arming a watch
    GetChildren { path: String, watch: bool },

    /// Create a node with the given ACL and mode
    Create {
        path: String,
        data: Option<Vec<u8>>,
        acl: Vec<Acl>,
        mode: CreateMode,
    },

    /// Delete a node if the version matches (-1 = any)
    Delete { path: String, version: i32 },

    /// Heartbeat; empty body
    Ping,

    /// Clean application-level close; empty body
    Close,
}

impl RequestBody {
    /// Get the opcode identifying this body on the wire
    pub fn opcode(&self) -> OpCode {
        match self {
            RequestBody::Exists { .. } => OpCode::Exists,
            RequestBody::GetData { .. } => OpCode::GetData,
            RequestBody::SetData { .. } => OpCode::SetData,
            RequestBody::GetChildren { .. } => OpCode::GetChildren2,
            RequestBody::Create { .. } => OpCode::Create,
            RequestBody::Delete { .. } => OpCode::Delete,
            RequestBody::Ping => OpCode::Ping,
            RequestBody::Close => OpCode::Close,
        }
    }

    /// Encode into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            RequestBody::Exists { path, watch }
            | RequestBody::GetData { path, watch }
            | RequestBody::GetChildren { path, watch } => {
                wire::put_string(dst, path);
                wire::put_bool(dst, *watch);
            }
            RequestBody::SetData {
                path,
                data,
                version,
            } => {
                wire::put_string(dst, path);
                wire::put_buffer(dst, data.as_deref());
                dst.put_i32(*version);
            }
            RequestBody::Create {
                path,
                data,
                acl,
                mode,
            } => {
                wire::put_string(dst, path);
                wire::put_buffer(dst, data.as_deref());
                dst.put_i32(acl.len() as i32);
                for entry in acl {
                    entry.encode(dst);
                }
                dst.put_i32(mode.as_i32());
            }
            RequestBody::Delete { path, version } => {
                wire::put_string(dst, path);
                dst.put_i32(*version);
            }
            RequestBody::Ping | RequestBody::Close => {}
        }
    }

    /// Decode a body of the given opcode from a byte buffer
    pub fn decode(opcode: OpCode, src: &mut impl Buf) -> Result<Self, ProtocolError> {
        match opcode {
            OpCode::Exists => Ok(RequestBody::Exists {
                path: wire::get_string(src)?,
                watch: wire::get_bool(src)?,
            }),
            OpCode::GetData => Ok(RequestBody::GetData {
                path: wire::get_string(src)?,
                watch: wire::get_bool(src)?,
            }),
            OpCode::SetData => Ok(RequestBody::SetData {
                path: wire::get_string(src)?,
                data: wire::get_buffer(src)?,
                version: wire::get_i32(src)?,
            }),
            OpCode::GetChildren2 => Ok(RequestBody::GetChildren {
                path: wire::get_string(src)?,
                watch: wire::get_bool(src)?,
            }),
            OpCode::Create => {
                let path = wire::get_string(src)?;
                let data = wire::get_buffer(src)?;
                let count = wire::get_i32(src)?;
                if count < 0 {
                    return Err(ProtocolError::InvalidLength(count));
                }
                let mut acl = Vec::with_capacity(count.min(64) as usize);
                for _ in 0..count {
                    acl.push(Acl::decode(src)?);
                }
                let raw = wire::get_i32(src)?;
                let mode =
                    CreateMode::from_i32(raw).ok_or(ProtocolError::UnknownCreateMode(raw))?;
                Ok(RequestBody::Create {
                    path,
                    data,
                    acl,
                    mode,
                })
            }
            OpCode::Delete => Ok(RequestBody::Delete {
                path: wire::get_string(src)?,
                version: wire::get_i32(src)?,
            }),
            OpCode::Ping => Ok(RequestBody::Ping),
            OpCode::Close => Ok(RequestBody::Close),
        }
    }
}

/// Body of a successful reply, decoded by the opcode of the request it answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Node metadata for an existence check
    Exists { stat: Stat },

    /// Node data and metadata
    GetData { data: Option<Vec<u8>>, stat: Stat },

    /// Metadata after a write
    SetData { stat: Stat },

    /// Child names and metadata
    GetChildren { children: Vec<String>, stat: Stat },

    /// Actual path of the created node (differs under sequential modes)
    Create { path: String },

    /// Empty body
    Delete,

    /// Empty body
    Ping,

    /// Empty body
    Close,
}

impl ResponseBody {
    /// Encode into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            ResponseBody::Exists { stat } | ResponseBody::SetData { stat } => stat.encode(dst),
            ResponseBody::GetData { data, stat } => {
                wire::put_buffer(dst, data.as_deref());
                stat.encode(dst);
            }
            ResponseBody::GetChildren { children, stat } => {
                wire::put_string_list(dst, children);
                stat.encode(dst);
            }
            ResponseBody::Create { path } => wire::put_string(dst, path),
            ResponseBody::Delete | ResponseBody::Ping | ResponseBody::Close => {}
        }
    }

    /// Decode a body answering the given opcode from a byte buffer
    pub fn decode(opcode: OpCode, src: &mut impl Buf) -> Result<Self, ProtocolError> {
        match opcode {
            OpCode::Exists => Ok(ResponseBody::Exists {
                stat: Stat::decode(src)?,
            }),
            OpCode::GetData => Ok(ResponseBody::GetData {
                data: wire::get_buffer(src)?,
                stat: Stat::decode(src)?,
            }),
            OpCode::SetData => Ok(ResponseBody::SetData {
                stat: Stat::decode(src)?,
            }),
            OpCode::GetChildren2 => Ok(ResponseBody::GetChildren {
                children: wire::get_string_list(src)?,
                stat: Stat::decode(src)?,
            }),
            OpCode::Create => Ok(ResponseBody::Create {
                path: wire::get_string(src)?,
            }),
            OpCode::Delete => Ok(ResponseBody::Delete),
            OpCode::Ping => Ok(ResponseBody::Ping),
            OpCode::Close => Ok(ResponseBody::Close),
        }
    }
}

/// Category of change a server-pushed watch event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EventType {
    /// Node came into existence
    NodeCreated = 1,
    /// Node was deleted
    NodeDeleted = 2,
    /// Node data changed
    NodeDataChanged = 3,
    /// Node child list changed
    NodeChildrenChanged = 4,
    /// Session lifecycle change, no path attached
    Session = -1,
    /// Watch was invalidated without firing
    NotWatching = -2,
}

impl EventType {
    /// Convert to the wire representation
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Convert from the wire representation
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::NodeCreated),
            2 => Some(Self::NodeDeleted),
            3 => Some(Self::NodeDataChanged),
            4 => Some(Self::NodeChildrenChanged),
            -1 => Some(Self::Session),
            -2 => Some(Self::NotWatching),
            _ => None,
        }
    }
}

/// Server-pushed notification carried on the event sentinel xid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherEvent {
    /// What changed
    pub event_type: EventType,
    /// Session state code at the server when the event fired
    pub state: i32,
    /// Path of the watched node; empty for session events
    pub path: String,
}

impl WatcherEvent {
    /// Encode into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i32(self.event_type.as_i32());
        dst.put_i32(self.state);
        wire::put_string(dst, &self.path);
    }

    /// Decode from a byte buffer
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let raw = wire::get_i32(src)?;
        let event_type =
            EventType::from_i32(raw).ok_or(ProtocolError::UnknownEventType(raw))?;
        Ok(Self {
            event_type,
            state: wire::get_i32(src)?,
            path: wire::get_string(src)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl;

    fn roundtrip_request(body: RequestBody) {
        let mut buf = BytesMut::new();
        body.encode(&mut buf);
        let decoded = RequestBody::decode(body.opcode(), &mut buf.freeze()).unwrap();
        assert_eq!(decoded, body);
    }

    fn roundtrip_response(opcode: OpCode, body: ResponseBody) {
        let mut buf = BytesMut::new();
        body.encode(&mut buf);
        let decoded = ResponseBody::decode(opcode, &mut buf.freeze()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_request_roundtrips() {
        roundtrip_request(RequestBody::Exists {
            path: "/a".into(),
            watch: true,
        });
        roundtrip_request(RequestBody::GetData {
            path: String::new(),
            watch: false,
        });
        roundtrip_request(RequestBody::SetData {
            path: "/a/b".into(),
            data: None,
            version: -1,
        });
        roundtrip_request(RequestBody::SetData {
            path: "/a/b".into(),
            data: Some(vec![]),
            version: 3,
        });
        roundtrip_request(RequestBody::GetChildren {
            path: "/".into(),
            watch: true,
        });
        roundtrip_request(RequestBody::Create {
            path: "/lock-".into(),
            data: Some(b"owner".to_vec()),
            acl: acl::world_acl(acl::perms::ALL),
            mode: CreateMode::EphemeralSequential,
        });
        roundtrip_request(RequestBody::Delete {
            path: "/a".into(),
            version: 7,
        });
        roundtrip_request(RequestBody::Ping);
        roundtrip_request(RequestBody::Close);
    }

    #[test]
    fn test_response_roundtrips() {
        let stat = Stat {
            czxid: 1,
            mzxid: 2,
            ctime: 3,
            mtime: 4,
            version: 5,
            cversion: 6,
            aversion: 7,
            ephemeral_owner: 8,
            data_length: 9,
            num_children: 10,
            pzxid: 11,
        };
        roundtrip_response(OpCode::Exists, ResponseBody::Exists { stat });
        roundtrip_response(
            OpCode::GetData,
            ResponseBody::GetData {
                data: None,
                stat,
            },
        );
        roundtrip_response(
            OpCode::GetData,
            ResponseBody::GetData {
                data: Some(vec![]),
                stat,
            },
        );
        roundtrip_response(OpCode::SetData, ResponseBody::SetData { stat });
        roundtrip_response(
            OpCode::GetChildren2,
            ResponseBody::GetChildren {
                children: vec![],
                stat,
            },
        );
        roundtrip_response(
            OpCode::GetChildren2,
            ResponseBody::GetChildren {
                children: (0..500).map(|i| format!("node-{i:04}")).collect(),
                stat,
            },
        );
        roundtrip_response(
            OpCode::Create,
            ResponseBody::Create {
                path: "/lock-0000000001".into(),
            },
        );
        roundtrip_response(OpCode::Delete, ResponseBody::Delete);
    }

    #[test]
    fn test_connect_roundtrip() {
        let req = ConnectRequest {
            protocol_version: 0,
            last_zxid_seen: 0x7fff_ffff_0000,
            timeout_ms: 30_000,
            session_id: 0x1234,
            secret: vec![0u8; 16],
        };
        let mut buf = BytesMut::new();
        req.encode(&mut buf);
        assert_eq!(ConnectRequest::decode(&mut buf.freeze()).unwrap(), req);

        let resp = ConnectResponse {
            protocol_version: 0,
            timeout_ms: 40_000,
            session_id: 0x5678,
            secret: (0..16).collect(),
        };
        let mut buf = BytesMut::new();
        resp.encode(&mut buf);
        assert_eq!(ConnectResponse::decode(&mut buf.freeze()).unwrap(), resp);
    }

    #[test]
    fn test_watcher_event_roundtrip() {
        let ev = WatcherEvent {
            event_type: EventType::NodeDataChanged,
            state: 101,
            path: "/watched".into(),
        };
        let mut buf = BytesMut::new();
        ev.encode(&mut buf);
        assert_eq!(WatcherEvent::decode(&mut buf.freeze()).unwrap(), ev);
    }

    #[test]
    fn test_truncated_stat() {
        let mut buf = BytesMut::new();
        buf.put_i64(1);
        buf.put_i64(2);
        assert!(matches!(
            Stat::decode(&mut buf.freeze()),
            Err(ProtocolError::ShortBuffer { .. })
        ));
    }
}
