//! Session lifecycle: supervisor, send loop, receive loop
//!
//! One supervisor task per client drives dial → handshake →
//! (send loop ∥ receive loop) → flush → reconnect-or-stop. The socket is
//! owned exclusively by the loops while a connection is live; callers only
//! ever touch the multiplexer and the watch registry.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::codec::{Encoder, FramedRead};
use tokio_util::sync::CancellationToken;

use quorum_protocol::{
    FrameCodec, OpCode, ProtocolError, ReplyHeader, RequestBody, RequestHeader, ResponseBody,
    WatcherEvent, Xid, SECRET_LEN,
};

use crate::backoff::ExponentialBackoff;
use crate::config::ClientConfig;
use crate::connector::Connector;
use crate::error::{ClientError, ServerError};
use crate::handshake;
use crate::multiplexer::{Multiplexer, Outbound, Reply};
use crate::state::{Event, SessionState};
use crate::watch::WatchRegistry;

/// Mutable session identity, owned by the supervisor and touched by the
/// receive loop only while a connection is live.
pub(crate) struct SessionData {
    /// Highest transaction id observed; proves freshness on reconnect
    pub last_zxid: i64,
    /// Server-issued session id; zero until the first handshake
    pub session_id: i64,
    /// Opaque session secret, replaced by the server on each handshake
    pub secret: Vec<u8>,
    /// Negotiated session timeout; seeded with the configured request
    pub timeout: Duration,
}

impl SessionData {
    pub fn new(requested: Duration) -> Self {
        Self {
            last_zxid: 0,
            session_id: 0,
            secret: vec![0; SECRET_LEN],
            timeout: requested,
        }
    }

    /// Forget the expired session identity
    pub fn expire(&mut self) {
        self.session_id = 0;
        self.secret = vec![0; SECRET_LEN];
        self.last_zxid = 0;
    }

    /// Heartbeat cadence: half the negotiated timeout
    pub fn heartbeat_interval(&self) -> Duration {
        (self.timeout / 2).max(Duration::from_millis(10))
    }
}

/// State shared between the supervisor, the loops, and caller handles
pub(crate) struct Shared {
    pub mux: Multiplexer,
    pub watches: WatchRegistry,
    /// Session-wide shutdown intent
    pub quit: CancellationToken,
    /// Teardown token of the live connection, if any
    conn: Mutex<Option<CancellationToken>>,
    state: AtomicI32,
    events: mpsc::Sender<Event>,
}

impl Shared {
    pub fn new(mux: Multiplexer, events: mpsc::Sender<Event>) -> Self {
        Self {
            mux,
            watches: WatchRegistry::new(),
            quit: CancellationToken::new(),
            conn: Mutex::new(None),
            state: AtomicI32::new(SessionState::Disconnected.as_code()),
            events,
        }
    }

    fn conn_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_conn(&self, token: CancellationToken) {
        *self.conn_slot() = Some(token);
    }

    /// Force the live connection, if any, to tear down
    pub fn abort_connection(&self) {
        if let Some(token) = self.conn_slot().as_ref() {
            token.cancel();
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_code(self.state.load(Ordering::SeqCst))
    }

    /// Publish a lifecycle transition. The event is dropped if the consumer
    /// is not keeping up; the state itself is always readable.
    fn set_state(&self, state: SessionState) {
        self.state.store(state.as_code(), Ordering::SeqCst);
        let _ = self.events.try_send(Event::session(state));
    }

    fn push_event(&self, event: Event) {
        let _ = self.events.try_send(event);
    }
}

/// Top-level control loop owning the session lifecycle
pub(crate) struct Supervisor {
    shared: Arc<Shared>,
    config: ClientConfig,
    queue: mpsc::Receiver<Outbound>,
}

impl Supervisor {
    pub fn new(shared: Arc<Shared>, config: ClientConfig, queue: mpsc::Receiver<Outbound>) -> Self {
        Self {
            shared,
            config,
            queue,
        }
    }

    /// Drive the session until shutdown is requested
    pub async fn run(mut self) {
        let mut connector = Connector::new(&self.config.servers, self.config.connect_timeout);
        let mut session = SessionData::new(self.config.session_timeout);
        let mut backoff = ExponentialBackoff::from_config(&self.config.backoff);

        while !self.shared.quit.is_cancelled() {
            self.shared.set_state(SessionState::Connecting);
            let mut stream = match connector.dial().await {
                Ok(stream) => stream,
                Err(err) => {
                    let delay = backoff.next_delay();
                    tracing::warn!("dial failed: {err}; retrying in {delay:?}");
                    if self.sleep_or_quit(delay).await {
                        break;
                    }
                    continue;
                }
            };
            self.shared.set_state(SessionState::Connected);

            match handshake::authenticate(&mut stream, &mut session, &self.shared.mux).await {
                Err(ClientError::SessionExpired) => {
                    tracing::warn!("session expired by server; continuing as a fresh session");
                    self.shared.set_state(SessionState::Expired);
                    self.shared.watches.invalidate_all(SessionState::Expired);
                    self.shared.mux.complete_all(|| ClientError::SessionExpired);
                    drop(stream);
                    let delay = backoff.next_delay();
                    if self.sleep_or_quit(delay).await {
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    tracing::warn!("handshake failed: {err}");
                    drop(stream);
                    let delay = backoff.next_delay();
                    if self.sleep_or_quit(delay).await {
                        break;
                    }
                    continue;
                }
                Ok(()) => {}
            }

            tracing::info!(
                session_id = session.session_id,
                server = connector.current(),
                "session established"
            );
            backoff.reset();
            self.shared.set_state(SessionState::HasSession);

            let write_deadline = session.timeout;
            let heartbeat = session.heartbeat_interval();
            let (read_half, write_half) = stream.into_split();
            let conn_done = CancellationToken::new();
            self.shared.set_conn(conn_done.clone());

            let (send_result, recv_result) = tokio::join!(
                send_loop(
                    &self.shared,
                    &mut self.queue,
                    write_half,
                    write_deadline,
                    heartbeat,
                    &conn_done,
                ),
                recv_loop(&self.shared, &mut session, read_half, &conn_done),
            );

            // Both loops have exited and the socket halves are gone
            self.shared.set_state(SessionState::Disconnected);

            if self.shared.quit.is_cancelled() {
                break;
            }

            if let Some(err) = recv_result.err().or(send_result.err()) {
                tracing::warn!("connection lost: {err}");
            }
            self.shared.mux.complete_all(|| ClientError::ConnectionClosed);
        }

        // Final teardown: nothing new is admitted past this point
        self.shared.set_state(SessionState::Disconnected);
        self.shared.mux.complete_all(|| ClientError::Closing);
        self.drain_queue();
        self.shared.watches.invalidate_all(SessionState::Disconnected);
        tracing::debug!("session supervisor stopped");
    }

    /// Sleep for `delay`, returning true if shutdown was requested meanwhile
    async fn sleep_or_quit(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shared.quit.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    /// Fail every queued-but-unsent request so no caller waits forever
    fn drain_queue(&mut self) {
        self.queue.close();
        while let Ok(outbound) = self.queue.try_recv() {
            let _ = outbound.completion.send(Err(ClientError::Closing));
        }
    }
}

/// Frame a request header and body into `dst`
fn encode_request(
    dst: &mut BytesMut,
    xid: Xid,
    body: &RequestBody,
) -> Result<(), ProtocolError> {
    let mut payload = BytesMut::new();
    RequestHeader::new(xid, body.opcode()).encode(&mut payload);
    body.encode(&mut payload);
    FrameCodec::new().encode(payload.freeze(), dst)
}

async fn write_frame(
    writer: &mut OwnedWriteHalf,
    frame: &[u8],
    deadline: Duration,
) -> Result<(), ClientError> {
    match timeout(deadline, writer.write_all(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(ClientError::Deadline("write")),
    }
}

/// Drain the outbound queue, interleaving heartbeats on a fixed cadence.
///
/// Each request is moved into the pending table before its bytes reach the
/// socket, so a fast reply can never race its own bookkeeping. Writes are
/// strictly ordered by submission order.
async fn send_loop(
    shared: &Shared,
    queue: &mut mpsc::Receiver<Outbound>,
    mut writer: OwnedWriteHalf,
    write_deadline: Duration,
    heartbeat: Duration,
    conn_done: &CancellationToken,
) -> Result<(), ClientError> {
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            _ = conn_done.cancelled() => return Ok(()),

            _ = ticker.tick() => {
                buf.clear();
                if let Err(err) = encode_request(&mut buf, Xid::PING, &RequestBody::Ping) {
                    conn_done.cancel();
                    return Err(err.into());
                }
                if let Err(err) = write_frame(&mut writer, &buf, write_deadline).await {
                    conn_done.cancel();
                    return Err(err);
                }
                tracing::trace!("heartbeat sent");
            }

            item = queue.recv() => {
                let Some(Outbound { xid, body, completion, hook }) = item else {
                    // Every handle is gone; nothing more will ever be queued
                    conn_done.cancel();
                    return Ok(());
                };

                buf.clear();
                if let Err(err) = encode_request(&mut buf, xid, &body) {
                    let _ = completion.send(Err(err.into()));
                    continue;
                }

                match shared.mux.try_register(xid, body.opcode(), completion, hook, conn_done) {
                    Ok(()) => {}
                    Err(completion) => {
                        // Teardown already in progress; reject without writing
                        let _ = completion.send(Err(ClientError::ConnectionClosed));
                        continue;
                    }
                }

                if let Err(err) = write_frame(&mut writer, &buf, write_deadline).await {
                    // The registered entry is flushed by the supervisor
                    conn_done.cancel();
                    return Err(err);
                }
            }
        }
    }
}

/// Read framed responses one at a time and route them: watch events to the
/// registry and the session event stream, heartbeat acks to the floor,
/// everything else to its pending caller.
async fn recv_loop(
    shared: &Shared,
    session: &mut SessionData,
    reader: OwnedReadHalf,
    conn_done: &CancellationToken,
) -> Result<(), ClientError> {
    let read_deadline = session.timeout;
    let mut frames = FramedRead::new(reader, FrameCodec::new());

    loop {
        let next = tokio::select! {
            _ = conn_done.cancelled() => return Ok(()),
            next = timeout(read_deadline, frames.next()) => next,
        };

        let mut payload = match next {
            Err(_) => {
                conn_done.cancel();
                return Err(ClientError::Deadline("read"));
            }
            Ok(None) => {
                conn_done.cancel();
                return Err(ClientError::ConnectionClosed);
            }
            Ok(Some(Err(err))) => {
                conn_done.cancel();
                return Err(err.into());
            }
            Ok(Some(Ok(payload))) => payload,
        };

        let header = match ReplyHeader::decode(&mut payload) {
            Ok(header) => header,
            Err(err) => {
                conn_done.cancel();
                return Err(err.into());
            }
        };

        if header.xid == Xid::EVENT.as_i32() {
            let event = match WatcherEvent::decode(&mut payload) {
                Ok(event) => event,
                Err(err) => {
                    conn_done.cancel();
                    return Err(err.into());
                }
            };
            tracing::debug!(path = %event.path, "watch event {:?}", event.event_type);
            shared.push_event(Event::from_wire(&event));
            shared.watches.dispatch(&event);
        } else if header.xid == Xid::PING.as_i32() {
            tracing::trace!("heartbeat acknowledged");
        } else if header.xid < 0 {
            tracing::warn!("reply with unexpected negative xid {}", header.xid);
        } else {
            if header.zxid > 0 {
                session.last_zxid = header.zxid;
            }

            let Some(pending) = shared.mux.take(header.xid) else {
                tracing::warn!("reply for unknown xid {}", header.xid);
                continue;
            };

            let result = if let Some(err) = ServerError::from_code(header.err) {
                Err(match err {
                    ServerError::SessionExpired => ClientError::SessionExpired,
                    other => ClientError::Server(other),
                })
            } else {
                match ResponseBody::decode(pending.opcode, &mut payload) {
                    Ok(body) => Ok(Reply {
                        zxid: header.zxid,
                        body,
                    }),
                    Err(err) => Err(err.into()),
                }
            };

            if let Some(hook) = pending.hook {
                hook(&result);
            }
            let _ = pending.completion.send(result);

            if pending.opcode == OpCode::Close {
                // Clean application-level close; end both loops
                conn_done.cancel();
                return Ok(());
            }
        }
    }
}
