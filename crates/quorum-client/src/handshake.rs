//! Session handshake
//!
//! One synchronous authenticate exchange on a fresh socket, before the
//! send/receive loops start. No application request is admitted until it
//! completes or fails.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use quorum_protocol::{ConnectRequest, ConnectResponse, MAX_FRAME_SIZE, PROTOCOL_VERSION};

use crate::error::ClientError;
use crate::multiplexer::Multiplexer;
use crate::session::SessionData;

/// Exchange connect request/response and adopt the negotiated session.
///
/// A zero session id in the reply means the presented session has expired:
/// local identity is reset and `SessionExpired` is returned. A reply with a
/// different session id than the one sent replaces the request-id space,
/// so the xid counter is reset.
pub(crate) async fn authenticate(
    stream: &mut TcpStream,
    session: &mut SessionData,
    mux: &Multiplexer,
) -> Result<(), ClientError> {
    let deadline = session.timeout;
    let sent_session_id = session.session_id;

    let request = ConnectRequest {
        protocol_version: PROTOCOL_VERSION,
        last_zxid_seen: session.last_zxid,
        timeout_ms: session.timeout.as_millis() as i32,
        session_id: sent_session_id,
        secret: session.secret.clone(),
    };

    let mut payload = BytesMut::new();
    request.encode(&mut payload);
    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.extend_from_slice(&payload);

    timeout(deadline, stream.write_all(&frame))
        .await
        .map_err(|_| ClientError::Deadline("handshake write"))??;

    let mut len_buf = [0u8; 4];
    timeout(deadline, stream.read_exact(&mut len_buf))
        .await
        .map_err(|_| ClientError::Deadline("handshake read"))??;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(quorum_protocol::ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        }
        .into());
    }

    let mut payload = vec![0u8; len];
    timeout(deadline, stream.read_exact(&mut payload))
        .await
        .map_err(|_| ClientError::Deadline("handshake read"))??;

    let mut src = payload.as_slice();
    let response = ConnectResponse::decode(&mut src)?;

    if response.session_id == 0 {
        session.expire();
        return Err(ClientError::SessionExpired);
    }

    if response.session_id != sent_session_id {
        // A new session replaces the request-id space
        mux.reset_xid();
    }

    session.timeout = std::time::Duration::from_millis(response.timeout_ms.max(0) as u64);
    session.session_id = response.session_id;
    session.secret = response.secret;

    Ok(())
}
