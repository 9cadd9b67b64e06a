//! Ordered, lossless listener sets.
//!
//! Each [`Subscription`] owns the receiving half of an unbounded channel, so
//! events are delivered in the order [`ListenerSet::notify`] was called and
//! are never dropped for slow consumers. Receivers run on their own task,
//! which keeps listener code from re-entering the notifier synchronously.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Identifies one subscription within its [`ListenerSet`].
pub type SubscriptionId = u64;

/// Receiving side of a listener registration.
#[derive(Debug)]
pub struct Subscription<E> {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the set is closed and
    /// every buffered event has been received.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Take an already-buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<E> {
        UnboundedReceiverStream::new(self.rx)
    }
}

struct Listeners<E> {
    senders: Vec<(SubscriptionId, mpsc::UnboundedSender<E>)>,
    closed: bool,
}

/// A set of subscribers that all receive every notified event.
pub struct ListenerSet<E> {
    inner: Mutex<Listeners<E>>,
    next_id: AtomicU64,
}

impl<E: Clone> ListenerSet<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Listeners {
                senders: Vec::new(),
                closed: false,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber. Subscribing to a closed set yields a
    /// subscription that is already finished.
    pub fn subscribe(&self) -> Subscription<E> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.senders.push((id, tx));
        }
        Subscription { id, rx }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.senders.len();
        inner.senders.retain(|(sid, _)| *sid != id);
        inner.senders.len() != before
    }

    /// Deliver `event` to every live subscriber, pruning the ones whose
    /// receiver was dropped. Returns how many received it.
    pub fn notify(&self, event: &E) -> usize {
        let mut inner = self.inner.lock();
        inner
            .senders
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
        inner.senders.len()
    }

    /// Stop accepting subscribers and end every existing subscription once
    /// its buffer is drained.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.senders.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone> Default for ListenerSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
