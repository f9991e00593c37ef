//! Replayable (cold) and multicast (hot) event streams.
//!
//! All streams and subscriptions live in a [`StreamRegistry`] arena. Handles
//! are plain copyable identifiers, so a subscription never keeps its stream
//! alive and a closed stream never dangles under a live subscription.

mod broadcaster;
mod registry;
mod subscription;

use std::fmt;

use serde::Serialize;

pub use broadcaster::Broadcaster;
pub use registry::{EventStream, StreamRegistry};
pub use subscription::{StreamSubscription, SubscriptionState};

/// Handle to a stream stored in a [`StreamRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StreamId(u32);

impl StreamId {
    /// Creates stream handle from raw arena index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns raw arena index.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Handle to a subscription stored in a [`StreamRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    /// Creates subscription handle from raw arena index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns raw arena index.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Identity of the consumer holding a subscription.
///
/// Used to reject a consumer subscribing twice to the same stream without
/// cancelling first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner-{}", self.0)
    }
}

/// Delivery mode of an event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamMode {
    /// Fixed sequence replayed independently to every subscriber
    Cold,
    /// Unbuffered multicast to subscribers present at emission time
    Hot,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMode::Cold => write!(f, "cold"),
            StreamMode::Hot => write!(f, "hot"),
        }
    }
}

/// Result of asking a subscription for its next event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextEvent<T> {
    /// Next queued value
    Value(T),
    /// Queue drained and the stream has completed
    Completed,
    /// Subscription was cancelled
    Cancelled,
    /// Nothing queued yet; the consumer must suspend until woken
    Pending,
}

/// Why a suspended consumer should be reconsidered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WakeCause {
    /// A value was enqueued
    Data,
    /// The stream was closed and completion is pending
    Closed,
    /// The subscription was cancelled
    Cancelled,
}

impl fmt::Display for WakeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeCause::Data => write!(f, "data"),
            WakeCause::Closed => write!(f, "closed"),
            WakeCause::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Notification that a subscription's readiness changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Wakeup {
    /// Subscription whose state changed
    pub subscription: SubscriptionId,
    /// What changed
    pub cause: WakeCause,
}

/// Summary of a single emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EmitOutcome {
    /// Number of subscriptions the value was enqueued on
    pub delivered: usize,
}

impl EmitOutcome {
    /// Returns true when nobody was listening and the value was lost.
    pub fn is_dropped(&self) -> bool {
        self.delivered == 0
    }
}

/// Errors raised by misuse of streams and subscriptions.
///
/// Every variant is a precondition violation by the caller. Ordinary data-flow
/// outcomes such as emitting with no subscribers are reported through
/// [`EmitOutcome`] instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Unknown stream: {stream}")]
    UnknownStream { stream: StreamId },

    #[error("Unknown subscription: {subscription}")]
    UnknownSubscription { subscription: SubscriptionId },

    #[error("{owner} already holds {existing} on {stream}")]
    AlreadySubscribed {
        stream: StreamId,
        owner: OwnerId,
        existing: SubscriptionId,
    },

    #[error("Subscription {subscription} was already cancelled")]
    AlreadyCancelled { subscription: SubscriptionId },

    #[error("Cannot {operation} on cold stream {stream}")]
    HotOnly {
        stream: StreamId,
        operation: &'static str,
    },

    #[error("Stream {stream} is closed")]
    StreamClosed { stream: StreamId },
}
