//! Length-prefixed frame codec and message headers
//!
//! The wire unit is a 4-byte big-endian length prefix followed by that many
//! payload bytes. Request payloads begin with `xid | opcode`; response
//! payloads begin with `xid | zxid | errcode`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::opcode::{OpCode, Xid};
use crate::wire;

/// Size of the frame length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Size of the decoded response header in bytes
pub const REPLY_HEADER_LEN: usize = 16;

/// Maximum payload size (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Header prefixed to every outgoing request payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Correlation id for this request
    pub xid: Xid,
    /// Operation the body encodes
    pub opcode: OpCode,
}

impl RequestHeader {
    /// Create a new request header
    pub fn new(xid: Xid, opcode: OpCode) -> Self {
        Self { xid, opcode }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i32(self.xid.as_i32());
        dst.put_i32(self.opcode.as_i32());
    }

    /// Decode a header from a byte buffer
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let xid = Xid(wire::get_i32(src)?);
        let raw = wire::get_i32(src)?;
        let opcode = OpCode::from_i32(raw).ok_or(ProtocolError::UnknownOpcode(raw))?;
        Ok(Self { xid, opcode })
    }
}

/// Header prefixed to every incoming response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    /// Correlation id, or a negative sentinel
    pub xid: i32,
    /// Server transaction id attached to this reply
    pub zxid: i64,
    /// Server error code; zero means success
    pub err: i32,
}

impl ReplyHeader {
    /// Create a new reply header
    pub fn new(xid: i32, zxid: i64, err: i32) -> Self {
        Self { xid, zxid, err }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i32(self.xid);
        dst.put_i64(self.zxid);
        dst.put_i32(self.err);
    }

    /// Decode a header from a byte buffer
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let xid = wire::get_i32(src)?;
        let zxid = wire::get_i64(src)?;
        let err = wire::get_i32(src)?;
        Ok(Self { xid, zxid, err })
    }
}

/// Codec splitting the byte stream into length-prefixed payloads.
///
/// Interpretation of the payload (request vs response direction) is left to
/// the caller; the codec only handles framing.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Declared length of a frame whose payload has not fully arrived
    pending_len: Option<usize>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self { pending_len: None }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.pending_len.take() {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_PREFIX_LEN {
                    return Ok(None);
                }
                let len = src.get_u32() as usize;
                if len > MAX_FRAME_SIZE {
                    return Err(ProtocolError::FrameTooLarge {
                        size: len,
                        max: MAX_FRAME_SIZE,
                    });
                }
                len
            }
        };

        if src.len() < len {
            // Save the length and wait for more data
            self.pending_len = Some(len);
            src.reserve(len - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        dst.reserve(LENGTH_PREFIX_LEN + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}
