//! Consumer-side handle state for a single stream subscription.

use std::collections::VecDeque;

use super::{NextEvent, OwnerId, StreamId, SubscriptionId};

/// Liveness of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Receiving values
    Active,
    /// Completion was observed after the queue drained
    Completed,
    /// Cancelled by the consumer or the harness
    Cancelled,
}

/// FIFO of undelivered values destined for one subscriber.
///
/// The queue is unbounded: producers are never blocked, consumers suspend
/// when they ask for a value and the queue is empty.
#[derive(Debug)]
pub struct StreamSubscription<T> {
    id: SubscriptionId,
    stream: StreamId,
    owner: Option<OwnerId>,
    queue: VecDeque<T>,
    state: SubscriptionState,
    completion_pending: bool,
    delivered: u64,
}

impl<T> StreamSubscription<T> {
    pub(crate) fn new(id: SubscriptionId, stream: StreamId, owner: Option<OwnerId>) -> Self {
        Self {
            id,
            stream,
            owner,
            queue: VecDeque::new(),
            state: SubscriptionState::Active,
            completion_pending: false,
            delivered: 0,
        }
    }

    /// Returns subscription handle.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the stream this subscription records interest in.
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Returns the owning consumer, if one was recorded.
    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    /// Returns current liveness state.
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Returns true while values can still be enqueued.
    pub fn is_active(&self) -> bool {
        self.state == SubscriptionState::Active && !self.completion_pending
    }

    /// Returns true once the stream has signalled completion to this subscriber.
    pub fn is_completion_pending(&self) -> bool {
        self.completion_pending
    }

    /// Number of values waiting to be consumed.
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of values handed to the consumer so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Appends a value at the tail of the queue.
    ///
    /// Returns false and drops the value when the subscription no longer
    /// accepts values.
    pub(crate) fn enqueue(&mut self, value: T) -> bool {
        if !self.is_active() {
            return false;
        }
        self.queue.push_back(value);
        true
    }

    pub(crate) fn mark_completion_pending(&mut self) {
        if self.state == SubscriptionState::Active {
            self.completion_pending = true;
        }
    }

    pub(crate) fn take_next(&mut self) -> NextEvent<T> {
        match self.state {
            SubscriptionState::Cancelled => NextEvent::Cancelled,
            SubscriptionState::Completed => NextEvent::Completed,
            SubscriptionState::Active => {
                if let Some(value) = self.queue.pop_front() {
                    self.delivered += 1;
                    NextEvent::Value(value)
                } else if self.completion_pending {
                    self.state = SubscriptionState::Completed;
                    NextEvent::Completed
                } else {
                    NextEvent::Pending
                }
            }
        }
    }

    /// Transitions to cancelled, returning the discarded values.
    pub(crate) fn cancel(&mut self) -> Vec<T> {
        self.state = SubscriptionState::Cancelled;
        self.completion_pending = false;
        self.queue.drain(..).collect()
    }

    pub(crate) fn peek_all(&self) -> impl Iterator<Item = &T> {
        self.queue.iter()
    }
}
