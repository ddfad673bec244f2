//! Live query listener registry.
//!
//! # Responsibility
//! - Track open live queries and deliver snapshot/error events to them.
//! - Hand out `Subscription` handles that unregister exactly once.
//!
//! # Invariants
//! - A closed or dropped subscription never receives further events.
//! - Events for one listener are delivered in send order.
//! - A queued snapshot is superseded by the next one, so a listener holds at
//!   most one pending snapshot and one pending error.

use crate::store::{Document, Query, StoreError};
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub type ListenerId = u64;

/// Event pushed to a live query.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    /// Full current result set, in query order.
    Snapshot(Vec<Document>),
    /// Listener-side failure. The subscription stays registered.
    Error(StoreError),
}

#[derive(Default)]
struct MailboxState {
    pending: VecDeque<SnapshotEvent>,
    closed: bool,
}

/// Per-listener event queue that coalesces superseded events.
#[derive(Default)]
struct Mailbox {
    state: Mutex<MailboxState>,
    ready: Condvar,
}

impl Mailbox {
    /// Queues `event`. Returns `false` once the receiving side is closed.
    fn push(&self, event: SnapshotEvent) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        match event {
            SnapshotEvent::Snapshot(_) => state.pending.clear(),
            SnapshotEvent::Error(_) => {
                if matches!(state.pending.back(), Some(SnapshotEvent::Error(_))) {
                    state.pending.pop_back();
                }
            }
        }
        state.pending.push_back(event);
        self.ready.notify_one();
        true
    }

    fn pop(&self) -> Option<SnapshotEvent> {
        self.state.lock().pending.pop_front()
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<SnapshotEvent> {
        let mut state = self.state.lock();
        if state.pending.is_empty() && !state.closed {
            self.ready.wait_for(&mut state, timeout);
        }
        state.pending.pop_front()
    }

    fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.clear();
        self.ready.notify_all();
    }
}

struct ListenerEntry {
    id: ListenerId,
    query: Query,
    mailbox: Arc<Mailbox>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    listeners: Mutex<Vec<ListenerEntry>>,
}

impl RegistryInner {
    fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        before != listeners.len()
    }
}

/// Shared registry of live query listeners.
///
/// Cloning is cheap; clones observe the same listeners.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live query and returns its subscription handle.
    ///
    /// Nothing is delivered until the owner of the registry sends events.
    pub fn register(&self, query: Query) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mailbox = Arc::new(Mailbox::default());
        self.inner.listeners.lock().push(ListenerEntry {
            id,
            query,
            mailbox: Arc::clone(&mailbox),
        });
        debug!("event=listener_register module=store status=ok listener_id={id}");

        Subscription {
            id,
            mailbox,
            registry: Arc::downgrade(&self.inner),
            closed: false,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Returns the listeners currently registered on `collection`.
    pub fn listeners_for(&self, collection: &str) -> Vec<(ListenerId, Query)> {
        self.inner
            .listeners
            .lock()
            .iter()
            .filter(|entry| entry.query.collection == collection)
            .map(|entry| (entry.id, entry.query.clone()))
            .collect()
    }

    /// Sends one event to one listener.
    ///
    /// Returns `false` when the listener is gone. A listener whose mailbox was
    /// closed without unregistering is removed here.
    pub fn send(&self, id: ListenerId, event: SnapshotEvent) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let Some(position) = listeners.iter().position(|entry| entry.id == id) else {
            return false;
        };
        if listeners[position].mailbox.push(event) {
            return true;
        }
        listeners.remove(position);
        debug!("event=listener_prune module=store status=ok listener_id={id}");
        false
    }

    /// Delivers `error` to every listener on `collection`.
    ///
    /// Returns how many listeners received it.
    pub fn emit_error(&self, collection: &str, error: StoreError) -> usize {
        self.listeners_for(collection)
            .into_iter()
            .filter(|(id, _)| self.send(*id, SnapshotEvent::Error(error.clone())))
            .count()
    }
}

/// Handle to one open live query.
///
/// Dropping the handle releases the listener; `close` does the same explicitly.
pub struct Subscription {
    id: ListenerId,
    mailbox: Arc<Mailbox>,
    registry: Weak<RegistryInner>,
    closed: bool,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns the next queued event without blocking.
    pub fn try_next(&self) -> Option<SnapshotEvent> {
        self.mailbox.pop()
    }

    /// Waits up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<SnapshotEvent> {
        self.mailbox.pop_timeout(timeout)
    }

    /// Number of events waiting to be handled.
    pub fn pending(&self) -> usize {
        self.mailbox.pending_len()
    }

    /// Feeds every queued event to `handler` and returns how many were handled.
    pub fn on_snapshot(&self, mut handler: impl FnMut(SnapshotEvent)) -> usize {
        let mut handled = 0;
        while let Some(event) = self.try_next() {
            handler(event);
            handled += 1;
        }
        handled
    }

    /// Releases the listener.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.mailbox.close();
        if let Some(registry) = self.registry.upgrade() {
            if registry.unregister(self.id) {
                debug!(
                    "event=listener_release module=store status=ok listener_id={}",
                    self.id
                );
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
