//! Event Dispatcher: ordered fan-out of [`InboundEvent`]s.
//!
//! Events live in one bounded ring shared by all subscribers; each
//! subscriber keeps its own cursor into it. Publishing never blocks. When
//! the ring is full the oldest event is evicted, counted in
//! [`EventDispatcher::dropped`], and any subscriber that had not read it
//! yet skips ahead.
//!
//! Events are kept until every current subscriber has read them. With no
//! subscribers the ring keeps the most recent events, which a new
//! subscriber receives first.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use tokio::sync::Notify;

use crate::types::InboundEvent;

struct Inner {
    buffer: VecDeque<InboundEvent>,
    /// Sequence number of `buffer[0]`.
    head_seq: u64,
    /// Next sequence number each subscriber will read.
    cursors: HashMap<u64, u64>,
    next_id: u64,
    dropped: u64,
    closed: bool,
}

impl Inner {
    fn tail_seq(&self) -> u64 {
        self.head_seq + self.buffer.len() as u64
    }

    fn trim(&mut self) {
        let Some(&min) = self.cursors.values().min() else {
            return;
        };
        while self.head_seq < min && self.buffer.pop_front().is_some() {
            self.head_seq += 1;
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded, drop-oldest event fan-out. Cheap to clone.
#[derive(Clone)]
pub struct EventDispatcher {
    shared: Arc<Shared>,
}

impl EventDispatcher {
    /// Create a dispatcher buffering at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    buffer: VecDeque::with_capacity(capacity),
                    head_seq: 0,
                    cursors: HashMap::new(),
                    next_id: 0,
                    dropped: 0,
                    closed: false,
                }),
                notify: Notify::new(),
                capacity,
            }),
        }
    }

    /// Register a subscriber. It first receives whatever is still buffered.
    pub fn subscribe(&self) -> Subscription {
        let mut inner = self.shared.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let start = inner.head_seq;
        inner.cursors.insert(id, start);
        debug!(target: "Dispatch", "Subscriber {id} registered at event {start}");

        Subscription {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    /// Remove a subscriber. Same as dropping the subscription.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Append an event for all subscribers. Never blocks.
    ///
    /// Events published after [`close`](Self::close) are discarded.
    pub fn publish(&self, event: InboundEvent) {
        {
            let mut inner = self.shared.lock();
            if inner.closed {
                return;
            }

            if inner.buffer.len() >= self.shared.capacity {
                inner.buffer.pop_front();
                inner.head_seq += 1;
                inner.dropped += 1;

                let head = inner.head_seq;
                let mut lagging = 0;
                for cursor in inner.cursors.values_mut() {
                    if *cursor < head {
                        *cursor = head;
                        lagging += 1;
                    }
                }
                warn!(
                    target: "Dispatch",
                    "Event buffer full ({} events), dropped oldest; {lagging} subscriber(s) lagging, {} dropped in total",
                    self.shared.capacity,
                    inner.dropped
                );
            }

            inner.buffer.push_back(event);
        }
        self.shared.notify.notify_waiters();
    }

    /// Total number of events evicted before every subscriber read them.
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().cursors.len()
    }

    /// Stop accepting events. Subscribers drain what is buffered, then end.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_waiters();
    }
}

/// Handle for one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    shared: Arc<Shared>,
    id: u64,
}

/// Result of a non-blocking receive.
#[derive(Debug, PartialEq)]
pub enum TryRecv {
    Event(InboundEvent),
    Empty,
    Closed,
}

impl Subscription {
    /// Next event without waiting.
    pub fn try_recv(&mut self) -> TryRecv {
        let mut inner = self.shared.lock();
        let Some(&cursor) = inner.cursors.get(&self.id) else {
            return TryRecv::Closed;
        };

        if cursor < inner.tail_seq() {
            let index = (cursor - inner.head_seq) as usize;
            let event = inner.buffer[index].clone();
            inner.cursors.insert(self.id, cursor + 1);
            inner.trim();
            TryRecv::Event(event)
        } else if inner.closed {
            TryRecv::Closed
        } else {
            TryRecv::Empty
        }
    }

    /// Wait for the next event. Returns `None` once the dispatcher is closed
    /// and everything buffered has been received.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        let shared = Arc::clone(&self.shared);
        loop {
            let notified = shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_recv() {
                TryRecv::Event(event) => return Some(event),
                TryRecv::Closed => return None,
                TryRecv::Empty => notified.await,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.cursors.remove(&self.id);
        inner.trim();
        debug!(target: "Dispatch", "Subscriber {} removed", self.id);
    }
}
