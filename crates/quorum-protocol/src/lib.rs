//! quorum-protocol: Wire protocol for the quorum coordination client
//!
//! This crate defines the binary protocol spoken between the client engine
//! and a coordination server: length-prefixed frames, the fixed big-endian
//! field layouts of every request and response, and the ACL descriptors
//! attached to node creation.

pub mod acl;
pub mod error;
pub mod frame;
pub mod message;
pub mod opcode;
pub mod wire;

pub use acl::Acl;
pub use error::ProtocolError;
pub use frame::{FrameCodec, ReplyHeader, RequestHeader, MAX_FRAME_SIZE, REPLY_HEADER_LEN};
pub use message::{
    ConnectRequest, ConnectResponse, CreateMode, EventType, RequestBody, ResponseBody, Stat,
    WatcherEvent,
};
pub use opcode::{OpCode, Xid, DEFAULT_PORT, PROTOCOL_VERSION, SECRET_LEN};
