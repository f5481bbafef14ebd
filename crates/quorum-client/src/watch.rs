//! Watch registry
//!
//! One-shot subscriptions keyed by (path, kind). A (path, kind) entry holds
//! a set of waiters, not a singleton. Delivering an event removes and
//! notifies every waiter for every kind the event satisfies, then clears
//! the entries so later lookups find nothing stale.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use quorum_protocol::{EventType, WatcherEvent};

use crate::state::{Event, SessionState};

/// Category of change a watch is armed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    /// Data change or deletion of an existing node
    Data,
    /// Creation (or any change) of a possibly-absent node
    Exist,
    /// Change to the child list
    Child,
}

/// Waiting end of a one-shot watch.
///
/// Resolves with the delivering event, with a not-watching event when the
/// session is torn down, or with `None` if the arming request failed.
pub struct Watch {
    rx: oneshot::Receiver<Event>,
}

impl Watch {
    pub(crate) fn channel() -> (oneshot::Sender<Event>, Watch) {
        let (tx, rx) = oneshot::channel();
        (tx, Watch { rx })
    }

    /// Wait for the watch to fire
    pub async fn wait(self) -> Option<Event> {
        self.rx.await.ok()
    }
}

type WaiterMap = HashMap<(String, WatchKind), Vec<oneshot::Sender<Event>>>;

pub(crate) struct WatchRegistry {
    watchers: Mutex<WaiterMap>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self {
            watchers: Mutex::new(HashMap::new()),
        }
    }

    fn map(&self) -> MutexGuard<'_, WaiterMap> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a waiter for (path, kind)
    pub fn register(&self, path: &str, kind: WatchKind, tx: oneshot::Sender<Event>) {
        self.map()
            .entry((path.to_string(), kind))
            .or_default()
            .push(tx);
    }

    /// Kinds a server event satisfies
    fn kinds_for(event_type: EventType) -> &'static [WatchKind] {
        match event_type {
            EventType::NodeCreated => &[WatchKind::Exist],
            EventType::NodeDeleted | EventType::NodeDataChanged => {
                &[WatchKind::Exist, WatchKind::Data, WatchKind::Child]
            }
            EventType::NodeChildrenChanged => &[WatchKind::Child],
            EventType::Session | EventType::NotWatching => &[],
        }
    }

    /// Deliver a server event to every matching waiter exactly once and
    /// clear the consumed entries. Returns the number of waiters notified.
    pub fn dispatch(&self, wire: &WatcherEvent) -> usize {
        let event = Event::from_wire(wire);
        let mut delivered = 0;
        let mut map = self.map();
        for kind in Self::kinds_for(wire.event_type) {
            if let Some(waiters) = map.remove(&(wire.path.clone(), *kind)) {
                for tx in waiters {
                    if tx.send(event.clone()).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    /// Tell every waiter its watch will never fire, then clear the registry
    pub fn invalidate_all(&self, state: SessionState) {
        let drained: Vec<((String, WatchKind), Vec<oneshot::Sender<Event>>)> =
            self.map().drain().collect();
        for ((path, _kind), waiters) in drained {
            for tx in waiters {
                let _ = tx.send(Event {
                    event_type: EventType::NotWatching,
                    state,
                    path: path.clone(),
                });
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map().len()
    }
}
