//! Public client handle
//!
//! `connect` hands back a handle immediately; operations queue until the
//! supervisor reaches the active state, and session lifecycle is observable
//! through the event stream, never through a constructor error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use quorum_protocol::{Acl, CreateMode, RequestBody, ResponseBody, Stat};

use crate::config::ClientConfig;
use crate::error::{ClientError, ServerError};
use crate::multiplexer::{CompletionHook, Multiplexer, Reply};
use crate::session::{Shared, Supervisor};
use crate::state::{Event, SessionState};
use crate::watch::{Watch, WatchKind};

/// Handle to one client session.
///
/// Cloning is cheap; clones share the same session. Callers never touch the
/// socket or the mutable session fields, only the multiplexer queue.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Create a session handle and start its supervisor.
    ///
    /// Returns the handle together with a read-only stream of session and
    /// watch events. Connection establishment happens in the background;
    /// operations issued before it completes are queued in submission order.
    pub fn connect(config: ClientConfig) -> (Client, mpsc::Receiver<Event>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_queue.max(1));
        let (queue_tx, queue_rx) = mpsc::channel(config.send_queue.max(1));
        let shared = Arc::new(Shared::new(Multiplexer::new(queue_tx), event_tx));
        let supervisor = Supervisor::new(Arc::clone(&shared), config, queue_rx);
        tokio::spawn(supervisor.run());
        (Client { shared }, event_rx)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    async fn request(&self, body: RequestBody) -> Result<Reply, ClientError> {
        self.request_with_hook(body, None).await
    }

    async fn request_with_hook(
        &self,
        body: RequestBody,
        hook: Option<CompletionHook>,
    ) -> Result<Reply, ClientError> {
        if self.shared.quit.is_cancelled() {
            return Err(ClientError::Closing);
        }
        let rx = self.shared.mux.submit(body, hook).await?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }

    /// Check whether a node exists. Absence is success, not an error.
    pub async fn exists(&self, path: &str) -> Result<Option<Stat>, ClientError> {
        let body = RequestBody::Exists {
            path: path.to_string(),
            watch: false,
        };
        match self.request(body).await {
            Ok(reply) => match reply.body {
                ResponseBody::Exists { stat } => Ok(Some(stat)),
                _ => Err(ClientError::UnexpectedResponse),
            },
            Err(ClientError::Server(ServerError::NoNode)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Existence check that also arms a one-shot watch: an existence watch
    /// when the node is absent, a data watch when it is present.
    pub async fn exists_watch(&self, path: &str) -> Result<(Option<Stat>, Watch), ClientError> {
        let (tx, watch) = Watch::channel();
        let shared = Arc::clone(&self.shared);
        let watched = path.to_string();
        let hook: CompletionHook = Box::new(move |result: &Result<Reply, ClientError>| {
            match result {
                Ok(_) => shared.watches.register(&watched, WatchKind::Data, tx),
                Err(ClientError::Server(ServerError::NoNode)) => {
                    shared.watches.register(&watched, WatchKind::Exist, tx)
                }
                // Dropping the sender cancels the watch
                Err(_) => {}
            }
        });
        let body = RequestBody::Exists {
            path: path.to_string(),
            watch: true,
        };
        match self.request_with_hook(body, Some(hook)).await {
            Ok(reply) => match reply.body {
                ResponseBody::Exists { stat } => Ok((Some(stat), watch)),
                _ => Err(ClientError::UnexpectedResponse),
            },
            Err(ClientError::Server(ServerError::NoNode)) => Ok((None, watch)),
            Err(err) => Err(err),
        }
    }

    /// Read a node's data and metadata
    pub async fn get(&self, path: &str) -> Result<(Option<Vec<u8>>, Stat), ClientError> {
        let body = RequestBody::GetData {
            path: path.to_string(),
            watch: false,
        };
        match self.request(body).await?.body {
            ResponseBody::GetData { data, stat } => Ok((data, stat)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Read a node's data and arm a one-shot data watch
    pub async fn get_watch(
        &self,
        path: &str,
    ) -> Result<(Option<Vec<u8>>, Stat, Watch), ClientError> {
        let (tx, watch) = Watch::channel();
        let shared = Arc::clone(&self.shared);
        let watched = path.to_string();
        let hook: CompletionHook = Box::new(move |result: &Result<Reply, ClientError>| {
            if result.is_ok() {
                shared.watches.register(&watched, WatchKind::Data, tx);
            }
        });
        let body = RequestBody::GetData {
            path: path.to_string(),
            watch: true,
        };
        match self.request_with_hook(body, Some(hook)).await?.body {
            ResponseBody::GetData { data, stat } => Ok((data, stat, watch)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Write a node's data if `version` matches (-1 accepts any version)
    pub async fn set(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        version: i32,
    ) -> Result<Stat, ClientError> {
        let body = RequestBody::SetData {
            path: path.to_string(),
            data,
            version,
        };
        match self.request(body).await?.body {
            ResponseBody::SetData { stat } => Ok(stat),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// List a node's children
    pub async fn children(&self, path: &str) -> Result<(Vec<String>, Stat), ClientError> {
        let body = RequestBody::GetChildren {
            path: path.to_string(),
            watch: false,
        };
        match self.request(body).await?.body {
            ResponseBody::GetChildren { children, stat } => Ok((children, stat)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// List a node's children and arm a one-shot children watch
    pub async fn children_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Stat, Watch), ClientError> {
        let (tx, watch) = Watch::channel();
        let shared = Arc::clone(&self.shared);
        let watched = path.to_string();
        let hook: CompletionHook = Box::new(move |result: &Result<Reply, ClientError>| {
            if result.is_ok() {
                shared.watches.register(&watched, WatchKind::Child, tx);
            }
        });
        let body = RequestBody::GetChildren {
            path: path.to_string(),
            watch: true,
        };
        match self.request_with_hook(body, Some(hook)).await?.body {
            ResponseBody::GetChildren { children, stat } => Ok((children, stat, watch)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Create a node; returns the actual path, which differs from the
    /// requested one under sequential modes
    pub async fn create(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        acl: Vec<Acl>,
        mode: CreateMode,
    ) -> Result<String, ClientError> {
        let body = RequestBody::Create {
            path: path.to_string(),
            data,
            acl,
            mode,
        };
        match self.request(body).await?.body {
            ResponseBody::Create { path } => Ok(path),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Delete a node if `version` matches (-1 accepts any version)
    pub async fn delete(&self, path: &str, version: i32) -> Result<(), ClientError> {
        let body = RequestBody::Delete {
            path: path.to_string(),
            version,
        };
        match self.request(body).await?.body {
            ResponseBody::Delete => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Delete a subtree depth-first. Pure orchestration over the core
    /// existence, listing, and delete operations; a subtree that is already
    /// absent is success.
    pub async fn delete_recursive(&self, path: &str) -> Result<(), ClientError> {
        if self.exists(path).await?.is_none() {
            return Ok(());
        }
        let (children, _) = self.children(path).await?;
        for child in children {
            let sub = if path == "/" {
                format!("/{child}")
            } else {
                format!("{path}/{child}")
            };
            Box::pin(self.delete_recursive(&sub)).await?;
        }
        self.delete(path, -1).await
    }

    /// Shut the session down.
    ///
    /// Signals the shared quit flag, then issues the protocol close
    /// operation through the normal queue so a live send loop writes a
    /// clean application-level close first, bounded by a short timeout in
    /// case the loops are already dead. Every request still pending
    /// afterwards completes with a closing error.
    pub async fn close(&self) {
        self.shared.quit.cancel();

        let graceful = async {
            if let Ok(rx) = self.shared.mux.submit(RequestBody::Close, None).await {
                let _ = rx.await;
            }
        };
        let _ = timeout(Duration::from_secs(1), graceful).await;

        self.shared.abort_connection();
    }
}
