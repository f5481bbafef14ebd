//! Session engine integration tests
//!
//! Each test runs an in-process mock server on a loopback port and scripts
//! its replies at the wire level through the protocol crate.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use quorum_client::{BackoffConfig, Client, ClientConfig, ClientError, SessionState};
use quorum_protocol::{
    ConnectRequest, ConnectResponse, EventType, ReplyHeader, RequestBody, RequestHeader,
    ResponseBody, Stat, WatcherEvent, Xid,
};

const NO_NODE: i32 = -101;

fn test_config(addr: &str) -> ClientConfig {
    let mut config = ClientConfig::new([addr]);
    config.session_timeout = Duration::from_millis(2000);
    config.connect_timeout = Duration::from_millis(500);
    config.backoff = BackoffConfig {
        initial: Duration::from_millis(50),
        max: Duration::from_millis(200),
        multiplier: 2.0,
        jitter: 0.0,
    };
    config.event_queue = 64;
    config
}

async fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.ok()?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.ok()?;
    Some(payload)
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.extend_from_slice(payload);
    stream.write_all(&frame).await.expect("mock write failed");
}

/// Accept one connection and complete the handshake with the given
/// negotiated session id and timeout. Returns the decoded connect request
/// so tests can assert on resume fields.
async fn accept_session(
    listener: &TcpListener,
    session_id: i64,
    timeout_ms: i32,
) -> (TcpStream, ConnectRequest) {
    let (mut stream, _) = listener.accept().await.expect("accept failed");
    let payload = read_frame(&mut stream).await.expect("no connect request");
    let request = ConnectRequest::decode(&mut payload.as_slice()).expect("bad connect request");

    let response = ConnectResponse {
        protocol_version: 0,
        timeout_ms,
        session_id,
        secret: vec![7u8; 16],
    };
    let mut buf = BytesMut::new();
    response.encode(&mut buf);
    write_frame(&mut stream, &buf).await;
    (stream, request)
}

async fn send_reply(stream: &mut TcpStream, header: ReplyHeader, body: Option<&ResponseBody>) {
    let mut payload = BytesMut::new();
    header.encode(&mut payload);
    if let Some(body) = body {
        body.encode(&mut payload);
    }
    write_frame(stream, &payload).await;
}

async fn send_event(stream: &mut TcpStream, event_type: EventType, path: &str) {
    let event = WatcherEvent {
        event_type,
        state: SessionState::HasSession.as_code(),
        path: path.to_string(),
    };
    let mut payload = BytesMut::new();
    ReplyHeader::new(Xid::EVENT.as_i32(), 0, 0).encode(&mut payload);
    event.encode(&mut payload);
    write_frame(stream, &payload).await;
}

/// Read frames until a caller-issued request arrives, acknowledging
/// heartbeats along the way. Returns None on EOF.
async fn next_request(stream: &mut TcpStream) -> Option<(i32, RequestBody)> {
    loop {
        let payload = read_frame(stream).await?;
        let mut src = payload.as_slice();
        let header = RequestHeader::decode(&mut src).expect("bad request header");
        let body = RequestBody::decode(header.opcode, &mut src).expect("bad request body");
        if header.xid == Xid::PING {
            send_reply(stream, ReplyHeader::new(Xid::PING.as_i32(), 0, 0), None).await;
            continue;
        }
        return Some((header.xid.as_i32(), body));
    }
}

/// Serve until the client's close request arrives, then acknowledge it
async fn serve_until_close(stream: &mut TcpStream) {
    while let Some((xid, body)) = next_request(stream).await {
        if matches!(body, RequestBody::Close) {
            send_reply(stream, ReplyHeader::new(xid, 0, 0), Some(&ResponseBody::Close)).await;
            break;
        }
    }
}

#[tokio::test]
async fn test_out_of_order_replies_reach_matching_callers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_session(&listener, 100, 2000).await;

        let mut collected = vec![];
        while collected.len() < 10 {
            let (xid, body) = next_request(&mut stream).await.unwrap();
            let RequestBody::GetData { path, .. } = body else {
                panic!("expected a get request, got {body:?}");
            };
            collected.push((xid, path));
        }

        // Answer in reverse submission order
        for (xid, path) in collected.into_iter().rev() {
            let body = ResponseBody::GetData {
                data: Some(format!("value-{path}").into_bytes()),
                stat: Stat::default(),
            };
            send_reply(&mut stream, ReplyHeader::new(xid, 1, 0), Some(&body)).await;
        }

        serve_until_close(&mut stream).await;
    });

    let (client, _events) = Client::connect(test_config(&addr));

    let mut tasks = vec![];
    for i in 0..10 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let path = format!("/x{i}");
            let (data, _) = client.get(&path).await.unwrap();
            assert_eq!(data, Some(format!("value-{path}").into_bytes()));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_spontaneous_heartbeat_ack_is_discarded() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_session(&listener, 100, 2000).await;
        let (xid, _) = next_request(&mut stream).await.unwrap();

        // Unsolicited heartbeat ack must not disturb the pending pairing
        send_reply(&mut stream, ReplyHeader::new(Xid::PING.as_i32(), 0, 0), None).await;

        let body = ResponseBody::GetData {
            data: Some(b"payload".to_vec()),
            stat: Stat::default(),
        };
        send_reply(&mut stream, ReplyHeader::new(xid, 1, 0), Some(&body)).await;
        serve_until_close(&mut stream).await;
    });

    let (client, _events) = Client::connect(test_config(&addr));
    let (data, _) = client.get("/hb").await.unwrap();
    assert_eq!(data, Some(b"payload".to_vec()));

    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_read_deadline_tears_down_and_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        // First connection: negotiate a short timeout, then go silent
        let (mut stream, first) = accept_session(&listener, 100, 400).await;
        assert_eq!(first.session_id, 0);
        while read_frame(&mut stream).await.is_some() {}
        drop(stream);

        // The client comes back trying to resume the same session
        let (mut stream, second) = accept_session(&listener, 100, 2000).await;
        assert_eq!(second.session_id, 100);

        let (xid, body) = next_request(&mut stream).await.unwrap();
        let RequestBody::GetData { path, .. } = body else {
            panic!("expected a get request, got {body:?}");
        };
        assert_eq!(path, "/after");
        let body = ResponseBody::GetData {
            data: Some(b"back".to_vec()),
            stat: Stat::default(),
        };
        send_reply(&mut stream, ReplyHeader::new(xid, 2, 0), Some(&body)).await;
        serve_until_close(&mut stream).await;
    });

    let (client, _events) = Client::connect(test_config(&addr));

    // In flight when the silent connection is torn down
    let err = client.get("/lost").await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));

    // Resolves once the session is re-established
    let (data, _) = timeout(Duration::from_secs(5), client.get("/after"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data, Some(b"back".to_vec()));

    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_watch_delivery_and_session_event_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_session(&listener, 100, 2000).await;

        let (xid, body) = next_request(&mut stream).await.unwrap();
        let RequestBody::GetData { path, watch } = body else {
            panic!("expected a get request, got {body:?}");
        };
        assert_eq!(path, "/w");
        assert!(watch, "watch flag must be set on the wire");

        let reply = ResponseBody::GetData {
            data: Some(b"v1".to_vec()),
            stat: Stat::default(),
        };
        send_reply(&mut stream, ReplyHeader::new(xid, 5, 0), Some(&reply)).await;

        // The watch is armed with the response; fire it
        send_event(&mut stream, EventType::NodeDataChanged, "/w").await;
        serve_until_close(&mut stream).await;
    });

    let (client, mut events) = Client::connect(test_config(&addr));

    let (data, _stat, watch) = client.get_watch("/w").await.unwrap();
    assert_eq!(data, Some(b"v1".to_vec()));

    let event = timeout(Duration::from_secs(5), watch.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, EventType::NodeDataChanged);
    assert_eq!(event.path, "/w");

    // The same notification reaches the session-wide event stream
    let seen = timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if event.event_type == EventType::NodeDataChanged && event.path == "/w" {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(seen);

    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_session_expiry_resets_identity() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        // Fresh session; answer one write with a transaction id
        let (mut stream, first) = accept_session(&listener, 500, 2000).await;
        assert_eq!(first.session_id, 0);
        assert_eq!(first.last_zxid_seen, 0);

        let (xid, body) = next_request(&mut stream).await.unwrap();
        assert!(matches!(body, RequestBody::SetData { .. }));
        send_reply(
            &mut stream,
            ReplyHeader::new(xid, 555, 0),
            Some(&ResponseBody::SetData {
                stat: Stat::default(),
            }),
        )
        .await;
        drop(stream);

        // Resume attempt carries the session identity and the last zxid
        let (stream, resume) = accept_session(&listener, 0, 2000).await;
        assert_eq!(resume.session_id, 500);
        assert_eq!(resume.last_zxid_seen, 555);
        // Zero session id in the reply means expired
        drop(stream);

        // After expiry the client must start from scratch
        let (mut stream, fresh) = accept_session(&listener, 777, 2000).await;
        assert_eq!(fresh.session_id, 0);
        assert_eq!(fresh.last_zxid_seen, 0);
        serve_until_close(&mut stream).await;
    });

    let (client, mut events) = Client::connect(test_config(&addr));
    client.set("/k", Some(b"v".to_vec()), -1).await.unwrap();

    // Expired, then re-established as a brand-new session
    let mut saw_expired = false;
    let reestablished = timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if event.state == SessionState::Expired {
                saw_expired = true;
            }
            if saw_expired && event.state == SessionState::HasSession {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(reestablished);

    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_request_queued_until_connected() {
    // Reserve a port, then free it so the first dial attempts are refused
    let placeholder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = placeholder.local_addr().unwrap().to_string();
    drop(placeholder);

    let (client, _events) = Client::connect(test_config(&addr));

    // Issued while nothing is listening; must queue, not fail
    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.exists("/q").await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!pending.is_finished());

    let listener = TcpListener::bind(&addr).await.unwrap();
    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_session(&listener, 9, 2000).await;
        let (xid, body) = next_request(&mut stream).await.unwrap();
        assert!(matches!(body, RequestBody::Exists { .. }));
        send_reply(&mut stream, ReplyHeader::new(xid, 1, NO_NODE), None).await;
        serve_until_close(&mut stream).await;
    });

    let result = timeout(Duration::from_secs(5), pending).await.unwrap().unwrap();
    assert_eq!(result.unwrap(), None);

    client.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_close_flushes_pending_requests() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        // Long negotiated timeout so nothing tears down on its own;
        // swallow every frame without replying
        let (mut stream, _) = accept_session(&listener, 100, 10_000).await;
        while read_frame(&mut stream).await.is_some() {}
    });

    let (client, _events) = Client::connect(test_config(&addr));

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.get("/p").await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.close().await;

    let result = timeout(Duration::from_secs(5), pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::Closing)));

    // Nothing new is admitted after shutdown
    assert!(matches!(
        client.exists("/x").await,
        Err(ClientError::Closing)
    ));

    server.await.unwrap();
}

#[tokio::test]
async fn test_close_while_disconnected_drains_queue() {
    // Nothing ever listens here; dials keep failing
    let placeholder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = placeholder.local_addr().unwrap().to_string();
    drop(placeholder);

    let (client, _events) = Client::connect(test_config(&addr));

    // Queued, never sent
    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.exists("/never").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.close().await;

    let result = timeout(Duration::from_secs(5), pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::Closing)));
}

#[tokio::test]
async fn test_delete_recursive_removes_subtree() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_session(&listener, 100, 2000).await;

        let mut tree: HashMap<String, Vec<String>> = HashMap::from([
            ("/a".to_string(), vec!["b".to_string(), "c".to_string()]),
            ("/a/b".to_string(), vec![]),
            ("/a/c".to_string(), vec![]),
        ]);

        while let Some((xid, body)) = next_request(&mut stream).await {
            match body {
                RequestBody::Exists { path, .. } => {
                    if tree.contains_key(&path) {
                        send_reply(
                            &mut stream,
                            ReplyHeader::new(xid, 1, 0),
                            Some(&ResponseBody::Exists {
                                stat: Stat::default(),
                            }),
                        )
                        .await;
                    } else {
                        send_reply(&mut stream, ReplyHeader::new(xid, 1, NO_NODE), None).await;
                    }
                }
                RequestBody::GetChildren { path, .. } => {
                    let children = tree.get(&path).cloned().unwrap_or_default();
                    send_reply(
                        &mut stream,
                        ReplyHeader::new(xid, 1, 0),
                        Some(&ResponseBody::GetChildren {
                            children,
                            stat: Stat::default(),
                        }),
                    )
                    .await;
                }
                RequestBody::Delete { path, .. } => {
                    assert!(
                        tree.get(&path).is_some_and(Vec::is_empty),
                        "deleted {path} before its children"
                    );
                    tree.remove(&path);
                    if let Some((parent, name)) = path.rsplit_once('/') {
                        let parent = if parent.is_empty() { "/" } else { parent };
                        if let Some(children) = tree.get_mut(parent) {
                            children.retain(|child| child != name);
                        }
                    }
                    send_reply(
                        &mut stream,
                        ReplyHeader::new(xid, 2, 0),
                        Some(&ResponseBody::Delete),
                    )
                    .await;
                }
                RequestBody::Close => {
                    send_reply(
                        &mut stream,
                        ReplyHeader::new(xid, 0, 0),
                        Some(&ResponseBody::Close),
                    )
                    .await;
                    break;
                }
                other => panic!("unexpected request {other:?}"),
            }
        }

        assert!(tree.is_empty(), "subtree not fully deleted: {tree:?}");
    });

    let (client, _events) = Client::connect(test_config(&addr));
    client.delete_recursive("/a").await.unwrap();

    client.close().await;
    server.await.unwrap();
}
