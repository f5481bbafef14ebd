//! Request multiplexer
//!
//! Issues a monotonically increasing id per operation, tracks in-flight
//! requests keyed by that id, and guarantees each caller exactly one
//! completion: a decoded reply, or an error injected on teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use quorum_protocol::{OpCode, RequestBody, ResponseBody, Xid};

use crate::error::ClientError;

/// A decoded, matched reply delivered to the waiting caller
#[derive(Debug)]
pub(crate) struct Reply {
    /// Transaction id the server attached to this reply
    pub zxid: i64,
    /// Operation-specific body
    pub body: ResponseBody,
}

/// Single-shot completion signal for one request
pub(crate) type Completion = oneshot::Sender<Result<Reply, ClientError>>;

/// Post-completion side effect, run by the receive loop before the waiter
/// is released. Used to arm a watch atomically with the response that
/// created it.
pub(crate) type CompletionHook = Box<dyn FnOnce(&Result<Reply, ClientError>) + Send>;

/// One operation travelling from a caller to the send loop
pub(crate) struct Outbound {
    pub xid: Xid,
    pub body: RequestBody,
    pub completion: Completion,
    pub hook: Option<CompletionHook>,
}

/// In-flight entry owned by the pending table
pub(crate) struct Pending {
    pub opcode: OpCode,
    pub completion: Completion,
    pub hook: Option<CompletionHook>,
}

pub(crate) struct Multiplexer {
    xid: AtomicI32,
    pending: Mutex<HashMap<i32, Pending>>,
    queue: mpsc::Sender<Outbound>,
}

impl Multiplexer {
    pub fn new(queue: mpsc::Sender<Outbound>) -> Self {
        Self {
            xid: AtomicI32::new(0),
            pending: Mutex::new(HashMap::new()),
            queue,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<i32, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically allocate the next request id
    pub fn next_xid(&self) -> Xid {
        Xid(self.xid.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Restart the id space; called when a handshake replaces the session
    pub fn reset_xid(&self) {
        self.xid.store(0, Ordering::SeqCst);
    }

    /// Allocate an id and queue the operation for the send loop. Returns
    /// the waiting end of the completion signal.
    pub async fn submit(
        &self,
        body: RequestBody,
        hook: Option<CompletionHook>,
    ) -> Result<oneshot::Receiver<Result<Reply, ClientError>>, ClientError> {
        let (tx, rx) = oneshot::channel();
        let outbound = Outbound {
            xid: self.next_xid(),
            body,
            completion: tx,
            hook,
        };
        self.queue
            .send(outbound)
            .await
            .map_err(|_| ClientError::Closing)?;
        Ok(rx)
    }

    /// Move an operation into the pending table unless the connection is
    /// already tearing down. The teardown check and the insert happen under
    /// one lock, so a request either lands in the table and gets flushed,
    /// or is handed back to be rejected outright.
    pub fn try_register(
        &self,
        xid: Xid,
        opcode: OpCode,
        completion: Completion,
        hook: Option<CompletionHook>,
        teardown: &CancellationToken,
    ) -> Result<(), Completion> {
        let mut table = self.table();
        if teardown.is_cancelled() {
            return Err(completion);
        }
        table.insert(
            xid.as_i32(),
            Pending {
                opcode,
                completion,
                hook,
            },
        );
        Ok(())
    }

    /// Remove and return the pending entry matching a reply id
    pub fn take(&self, xid: i32) -> Option<Pending> {
        self.table().remove(&xid)
    }

    /// Deliver an error to every pending request and clear the table
    pub fn complete_all(&self, err: impl Fn() -> ClientError) {
        let drained: Vec<Pending> = {
            let mut table = self.table();
            table.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            let result = Err(err());
            if let Some(hook) = entry.hook {
                hook(&result);
            }
            let _ = entry.completion.send(result);
        }
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.table().len()
    }
}
