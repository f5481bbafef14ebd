//! Primitive field encoding/decoding
//!
//! All structures on the wire are flat sequences of fields with no padding.
//! Numeric fields are fixed-width big-endian. Booleans are one byte (0/1).
//! Strings are a 4-byte signed length followed by UTF-8 bytes. Buffers use
//! the same layout, but a negative length denotes a null payload, which is
//! distinct from a zero-length one and round-trips losslessly.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

fn ensure(src: &impl Buf, needed: usize) -> Result<(), ProtocolError> {
    let remaining = src.remaining();
    if remaining < needed {
        return Err(ProtocolError::ShortBuffer { needed, remaining });
    }
    Ok(())
}

pub fn get_i32(src: &mut impl Buf) -> Result<i32, ProtocolError> {
    ensure(src, 4)?;
    Ok(src.get_i32())
}

pub fn get_i64(src: &mut impl Buf) -> Result<i64, ProtocolError> {
    ensure(src, 8)?;
    Ok(src.get_i64())
}

pub fn get_bool(src: &mut impl Buf) -> Result<bool, ProtocolError> {
    ensure(src, 1)?;
    Ok(src.get_u8() != 0)
}

pub fn put_bool(dst: &mut impl BufMut, v: bool) {
    dst.put_u8(u8::from(v));
}

pub fn put_string(dst: &mut impl BufMut, s: &str) {
    dst.put_i32(s.len() as i32);
    dst.put_slice(s.as_bytes());
}

pub fn get_string(src: &mut impl Buf) -> Result<String, ProtocolError> {
    let len = get_i32(src)?;
    if len < 0 {
        return Err(ProtocolError::InvalidLength(len));
    }
    let len = len as usize;
    ensure(src, len)?;
    let mut raw = vec![0u8; len];
    src.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)
}

pub fn put_buffer(dst: &mut impl BufMut, v: Option<&[u8]>) {
    match v {
        None => dst.put_i32(-1),
        Some(b) => {
            dst.put_i32(b.len() as i32);
            dst.put_slice(b);
        }
    }
}

pub fn get_buffer(src: &mut impl Buf) -> Result<Option<Vec<u8>>, ProtocolError> {
    let len = get_i32(src)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    ensure(src, len)?;
    let mut raw = vec![0u8; len];
    src.copy_to_slice(&mut raw);
    Ok(Some(raw))
}

pub fn put_string_list(dst: &mut impl BufMut, items: &[String]) {
    dst.put_i32(items.len() as i32);
    for item in items {
        put_string(dst, item);
    }
}

pub fn get_string_list(src: &mut impl Buf) -> Result<Vec<String>, ProtocolError> {
    let count = get_i32(src)?;
    if count < 0 {
        return Err(ProtocolError::InvalidLength(count));
    }
    let mut items = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        items.push(get_string(src)?);
    }
    Ok(items)
}
