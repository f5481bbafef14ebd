//! Access-control descriptors attached to node creation
//!
//! These are static authorization descriptors, not protocol logic; the
//! constructors mirror the server's built-in schemes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{Buf, BufMut, BytesMut};
use sha1::{Digest, Sha1};

use crate::error::ProtocolError;
use crate::wire;

/// Permission bits for ACL entries
pub mod perms {
    /// Read node data and list children
    pub const READ: i32 = 1 << 0;
    /// Write node data
    pub const WRITE: i32 = 1 << 1;
    /// Create children
    pub const CREATE: i32 = 1 << 2;
    /// Delete the node
    pub const DELETE: i32 = 1 << 3;
    /// Change the node's ACL
    pub const ADMIN: i32 = 1 << 4;
    /// All of the above
    pub const ALL: i32 = 0x1f;
}

/// One access-control entry: permission bits plus a scheme-qualified identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    /// Permission bits from [`perms`]
    pub perms: i32,
    /// Authorization scheme ("world", "auth", "digest", "ip")
    pub scheme: String,
    /// Scheme-specific identity
    pub id: String,
}

impl Acl {
    /// Encode into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_i32(self.perms);
        wire::put_string(dst, &self.scheme);
        wire::put_string(dst, &self.id);
    }

    /// Decode from a byte buffer
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(Self {
            perms: wire::get_i32(src)?,
            scheme: wire::get_string(src)?,
            id: wire::get_string(src)?,
        })
    }
}

/// ACL granting `perms` to every client
pub fn world_acl(perms: i32) -> Vec<Acl> {
    vec![Acl {
        perms,
        scheme: "world".to_string(),
        id: "anyone".to_string(),
    }]
}

/// ACL granting `perms` to any authenticated client
pub fn auth_acl(perms: i32) -> Vec<Acl> {
    vec![Acl {
        perms,
        scheme: "auth".to_string(),
        id: String::new(),
    }]
}

/// ACL granting `perms` to the holder of a username/password pair.
///
/// The identity is `user:base64(sha1("user:password"))`, matching the
/// server's digest scheme.
pub fn digest_acl(perms: i32, user: &str, password: &str) -> Vec<Acl> {
    let digest = Sha1::digest(format!("{user}:{password}").as_bytes());
    vec![Acl {
        perms,
        scheme: "digest".to_string(),
        id: format!("{user}:{}", BASE64.encode(digest)),
    }]
}

/// ACL granting `perms` to clients from the given address
pub fn ip_acl(perms: i32, ip: &str) -> Vec<Acl> {
    vec![Acl {
        perms,
        scheme: "ip".to_string(),
        id: ip.to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_roundtrip() {
        let entry = Acl {
            perms: perms::READ | perms::WRITE,
            scheme: "digest".to_string(),
            id: "user:hash".to_string(),
        };
        let mut buf = BytesMut::new();
        entry.encode(&mut buf);
        assert_eq!(Acl::decode(&mut buf.freeze()).unwrap(), entry);
    }

    #[test]
    fn test_world_acl() {
        let acl = world_acl(perms::ALL);
        assert_eq!(acl.len(), 1);
        assert_eq!(acl[0].scheme, "world");
        assert_eq!(acl[0].id, "anyone");
        assert_eq!(acl[0].perms, 0x1f);
    }

    #[test]
    fn test_digest_acl_form() {
        let acl = digest_acl(perms::ALL, "alice", "secret");
        // base64(sha1("alice:secret"))
        assert_eq!(acl[0].id, "alice:aYXlLOpEooaV1cRAvUL1fp9Qt7E=");
        assert_eq!(acl[0].scheme, "digest");
    }
}
