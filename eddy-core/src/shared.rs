//! Thread-safe stream backend for validating real concurrent use.
//!
//! Independent of the virtual-time harness: subscribers are tokio unbounded
//! queues and the broadcaster serializes `subscribe`, `cancel`, `emit` and
//! `close` behind one mutex.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, trace};

use crate::push::PushService;
use crate::stream::{EmitOutcome, StreamError, StreamId, SubscriptionId};

static NEXT_SHARED_STREAM: AtomicU32 = AtomicU32::new(0);

struct SharedInner<T> {
    stream: StreamId,
    next_id: u32,
    subscribers: Vec<(SubscriptionId, UnboundedSender<T>)>,
    closed: bool,
}

/// Multicast hub shared across threads.
pub struct SharedBroadcaster<T> {
    inner: Arc<Mutex<SharedInner<T>>>,
}

impl<T> Clone for SharedBroadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for SharedBroadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> SharedBroadcaster<T> {
    /// Creates broadcaster with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedInner {
                stream: StreamId::new(NEXT_SHARED_STREAM.fetch_add(1, Ordering::Relaxed)),
                next_id: 0,
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Registers a new subscriber that sees only values emitted from now on.
    ///
    /// Subscribing after [`close`](Self::close) yields an already completed
    /// subscription.
    pub fn subscribe(&self) -> SharedSubscription<T> {
        let mut inner = self.inner.lock();
        let id = SubscriptionId::new(inner.next_id);
        inner.next_id += 1;

        let (sender, receiver) = unbounded_channel();
        if !inner.closed {
            inner.subscribers.push((id, sender));
        }
        trace!("Shared {} registered", id);

        SharedSubscription {
            id,
            receiver,
            cancelled: false,
        }
    }

    /// Enqueues `value` on every live subscriber, in registration order.
    ///
    /// Subscribers whose receiving side is gone are pruned.
    ///
    /// # Errors
    ///
    /// - `StreamError::StreamClosed` - Broadcaster was closed
    pub fn emit(&self, value: T) -> Result<EmitOutcome, StreamError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(StreamError::StreamClosed {
                stream: inner.stream,
            });
        }

        let mut delivered = 0;
        inner
            .subscribers
            .retain(|(_, sender)| match sender.send(value.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            });

        if delivered == 0 {
            debug!("Dropping emission on shared {} with no subscribers", inner.stream);
        }
        Ok(EmitOutcome { delivered })
    }

    /// Unregisters `subscription` and discards whatever it had not consumed.
    ///
    /// Returns the number of discarded values. Cancelling a subscription of a
    /// closed broadcaster is allowed and drops its undelivered tail.
    ///
    /// # Errors
    ///
    /// - `StreamError::AlreadyCancelled` - Subscription was cancelled before
    pub fn cancel(&self, subscription: &mut SharedSubscription<T>) -> Result<usize, StreamError> {
        if subscription.cancelled {
            return Err(StreamError::AlreadyCancelled {
                subscription: subscription.id,
            });
        }
        self.inner
            .lock()
            .subscribers
            .retain(|(id, _)| *id != subscription.id);

        subscription.cancelled = true;
        subscription.receiver.close();
        let mut discarded = 0;
        while subscription.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        trace!("Shared {} cancelled, {} values discarded", subscription.id, discarded);
        Ok(discarded)
    }

    /// Closes the hub; subscribers complete once their queues drain.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let count = inner.subscribers.len();
        inner.subscribers.clear();
        debug!("Closed shared {} with {} subscribers", inner.stream, count);
    }

    /// Returns process-unique handle of this hub.
    pub fn stream(&self) -> StreamId {
        self.inner.lock().stream
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl<T: Clone + Send + 'static> PushService<T> for SharedBroadcaster<T> {
    fn push(&mut self, value: T) -> Result<EmitOutcome, StreamError> {
        self.emit(value)
    }
}

/// Consumer handle for a [`SharedStream`].
pub struct SharedSubscription<T> {
    id: SubscriptionId,
    receiver: UnboundedReceiver<T>,
    cancelled: bool,
}

impl<T> SharedSubscription<T> {
    /// Returns subscription handle.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next value; `None` once the stream completed or was cancelled.
    pub async fn next_value(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Returns the next queued value without waiting.
    pub fn try_next_value(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> Stream for SharedSubscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver.poll_recv(cx)
    }
}

/// Cold or hot stream usable from many threads.
pub enum SharedStream<T> {
    /// Replays a fixed sequence to every subscriber
    Cold {
        values: Arc<[T]>,
        next_id: Arc<AtomicU32>,
    },
    /// Broadcasts to current subscribers only
    Hot(SharedBroadcaster<T>),
}

impl<T: Clone + Send + 'static> SharedStream<T> {
    /// Creates cold stream over `values`.
    pub fn new_cold(values: impl IntoIterator<Item = T>) -> Self {
        SharedStream::Cold {
            values: values.into_iter().collect(),
            next_id: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Creates hot stream with no subscribers.
    pub fn new_hot() -> Self {
        SharedStream::Hot(SharedBroadcaster::new())
    }

    /// Subscribes; cold subscriptions are pre-filled and complete after draining.
    pub fn subscribe(&self) -> SharedSubscription<T> {
        match self {
            SharedStream::Cold { values, next_id } => {
                let id = SubscriptionId::new(next_id.fetch_add(1, Ordering::Relaxed));
                let (sender, receiver) = unbounded_channel();
                for value in values.iter() {
                    // Receiver is alive; send cannot fail here.
                    let _ = sender.send(value.clone());
                }
                SharedSubscription {
                    id,
                    receiver,
                    cancelled: false,
                }
            }
            SharedStream::Hot(broadcaster) => broadcaster.subscribe(),
        }
    }

    /// Returns the broadcaster of a hot stream.
    pub fn broadcaster(&self) -> Option<&SharedBroadcaster<T>> {
        match self {
            SharedStream::Cold { .. } => None,
            SharedStream::Hot(broadcaster) => Some(broadcaster),
        }
    }
}
