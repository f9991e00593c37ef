//! Arena owning every stream and subscription of one execution.

use std::fmt;

use tracing::{debug, trace};

use super::{
    Broadcaster, EmitOutcome, NextEvent, OwnerId, StreamError, StreamId, StreamMode,
    StreamSubscription, SubscriptionId, SubscriptionState, WakeCause, Wakeup,
};
use crate::push::HotPush;

#[derive(Debug)]
enum StreamSource<T> {
    Cold { values: Vec<T> },
    Hot { broadcaster: Broadcaster },
}

/// A cold replayable sequence or a hot broadcast channel.
#[derive(Debug)]
pub struct EventStream<T> {
    id: StreamId,
    source: StreamSource<T>,
    closed: bool,
}

impl<T> EventStream<T> {
    /// Returns stream handle.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Returns delivery mode.
    pub fn mode(&self) -> StreamMode {
        match self.source {
            StreamSource::Cold { .. } => StreamMode::Cold,
            StreamSource::Hot { .. } => StreamMode::Hot,
        }
    }

    /// Returns true once a hot stream was explicitly closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the fixed sequence of a cold stream.
    pub fn replay_values(&self) -> Option<&[T]> {
        match &self.source {
            StreamSource::Cold { values } => Some(values),
            StreamSource::Hot { .. } => None,
        }
    }

    /// Number of subscriptions currently registered for broadcast.
    pub fn subscriber_count(&self) -> usize {
        match &self.source {
            StreamSource::Cold { .. } => 0,
            StreamSource::Hot { broadcaster } => broadcaster.len(),
        }
    }
}

/// Owns streams and subscriptions and records readiness changes.
///
/// Every mutation goes through `&mut self`, so a single driver (the
/// cooperative scheduler) serializes all state transitions. Wakeups are
/// accumulated in the order they happen and drained by the driver with
/// [`take_wakeups`](Self::take_wakeups).
pub struct StreamRegistry<T> {
    streams: Vec<EventStream<T>>,
    subscriptions: Vec<StreamSubscription<T>>,
    wakeups: Vec<Wakeup>,
}

impl<T> Default for StreamRegistry<T> {
    fn default() -> Self {
        Self {
            streams: Vec::new(),
            subscriptions: Vec::new(),
            wakeups: Vec::new(),
        }
    }
}

impl<T> fmt::Debug for StreamRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("streams", &self.streams.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("pending_wakeups", &self.wakeups.len())
            .finish()
    }
}

impl<T: Clone + fmt::Debug> StreamRegistry<T> {
    /// Creates empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates cold stream replaying `values` to every subscriber.
    pub fn create_cold(&mut self, values: impl IntoIterator<Item = T>) -> StreamId {
        let values: Vec<T> = values.into_iter().collect();
        let id = StreamId::new(self.streams.len() as u32);
        debug!("Created cold {} with {} values", id, values.len());
        self.streams.push(EventStream {
            id,
            source: StreamSource::Cold { values },
            closed: false,
        });
        id
    }

    /// Creates hot stream with no subscribers and no history.
    pub fn create_hot(&mut self) -> StreamId {
        let id = StreamId::new(self.streams.len() as u32);
        debug!("Created hot {}", id);
        self.streams.push(EventStream {
            id,
            source: StreamSource::Hot {
                broadcaster: Broadcaster::new(),
            },
            closed: false,
        });
        id
    }

    /// Returns stream by handle.
    pub fn stream(&self, stream: StreamId) -> Option<&EventStream<T>> {
        self.streams.get(stream.as_u32() as usize)
    }

    /// Returns subscription by handle.
    pub fn subscription(&self, subscription: SubscriptionId) -> Option<&StreamSubscription<T>> {
        self.subscriptions.get(subscription.as_u32() as usize)
    }

    /// Subscribes an anonymous consumer.
    ///
    /// Cold streams enqueue their whole sequence and mark completion pending.
    /// Hot streams register with the broadcaster and start empty.
    ///
    /// # Errors
    ///
    /// - `StreamError::UnknownStream` - Handle does not name a stream
    pub fn subscribe(&mut self, stream: StreamId) -> Result<SubscriptionId, StreamError> {
        self.attach(stream, None)
    }

    /// Subscribes a consumer identified by `owner`.
    ///
    /// # Errors
    ///
    /// - `StreamError::UnknownStream` - Handle does not name a stream
    /// - `StreamError::AlreadySubscribed` - Owner holds an uncancelled subscription on this stream
    pub fn subscribe_owned(
        &mut self,
        stream: StreamId,
        owner: OwnerId,
    ) -> Result<SubscriptionId, StreamError> {
        let existing = self.subscriptions.iter().find(|sub| {
            sub.stream() == stream
                && sub.owner() == Some(owner)
                && sub.state() != SubscriptionState::Cancelled
        });
        if let Some(existing) = existing {
            return Err(StreamError::AlreadySubscribed {
                stream,
                owner,
                existing: existing.id(),
            });
        }
        self.attach(stream, Some(owner))
    }

    fn attach(
        &mut self,
        stream: StreamId,
        owner: Option<OwnerId>,
    ) -> Result<SubscriptionId, StreamError> {
        let id = SubscriptionId::new(self.subscriptions.len() as u32);
        let entry = self
            .streams
            .get_mut(stream.as_u32() as usize)
            .ok_or(StreamError::UnknownStream { stream })?;

        let mut subscription = StreamSubscription::new(id, stream, owner);
        match &mut entry.source {
            StreamSource::Cold { values } => {
                for value in values.iter() {
                    subscription.enqueue(value.clone());
                }
                subscription.mark_completion_pending();
                trace!("{} replaying {} values to {}", stream, values.len(), id);
            }
            StreamSource::Hot { broadcaster } => {
                if entry.closed {
                    subscription.mark_completion_pending();
                } else {
                    broadcaster.register(id);
                }
                trace!("{} subscribed to hot {}", id, stream);
            }
        }

        self.subscriptions.push(subscription);
        Ok(id)
    }

    /// Cancels a subscription, discarding undelivered values.
    ///
    /// Producer calls after cancellation are silently dropped for this
    /// subscriber. Returns the number of discarded values.
    ///
    /// # Errors
    ///
    /// - `StreamError::UnknownSubscription` - Handle does not name a subscription
    /// - `StreamError::AlreadyCancelled` - Subscription was cancelled before
    pub fn cancel(&mut self, subscription: SubscriptionId) -> Result<usize, StreamError> {
        let sub = self
            .subscriptions
            .get_mut(subscription.as_u32() as usize)
            .ok_or(StreamError::UnknownSubscription { subscription })?;
        if sub.state() == SubscriptionState::Cancelled {
            return Err(StreamError::AlreadyCancelled { subscription });
        }

        let stream = sub.stream();
        let discarded = sub.cancel().len();
        if let Some(EventStream {
            source: StreamSource::Hot { broadcaster },
            ..
        }) = self.streams.get_mut(stream.as_u32() as usize)
        {
            broadcaster.unregister(subscription);
        }

        trace!("Cancelled {} ({} values discarded)", subscription, discarded);
        self.wakeups.push(Wakeup {
            subscription,
            cause: WakeCause::Cancelled,
        });
        Ok(discarded)
    }

    /// Broadcasts `value` to every subscriber of a hot stream.
    ///
    /// With no subscribers the value is lost; this is logged, not an error.
    ///
    /// # Errors
    ///
    /// - `StreamError::UnknownStream` - Handle does not name a stream
    /// - `StreamError::HotOnly` - Stream is cold
    /// - `StreamError::StreamClosed` - Stream was closed
    pub fn emit(&mut self, stream: StreamId, value: T) -> Result<EmitOutcome, StreamError> {
        let entry = self
            .streams
            .get(stream.as_u32() as usize)
            .ok_or(StreamError::UnknownStream { stream })?;
        if entry.closed {
            return Err(StreamError::StreamClosed { stream });
        }
        let StreamSource::Hot { broadcaster } = &entry.source else {
            return Err(StreamError::HotOnly {
                stream,
                operation: "emit",
            });
        };

        if broadcaster.is_empty() {
            debug!("Dropping {:?} emitted on {} with no subscribers", value, stream);
            return Ok(EmitOutcome::default());
        }

        let delivered = broadcaster.emit(value, &mut self.subscriptions);
        trace!("{} delivered to {} subscribers", stream, delivered.len());
        self.wakeups
            .extend(delivered.iter().map(|subscription| Wakeup {
                subscription: *subscription,
                cause: WakeCause::Data,
            }));

        Ok(EmitOutcome {
            delivered: delivered.len(),
        })
    }

    /// Closes a hot stream; every subscriber completes once its queue drains.
    ///
    /// # Errors
    ///
    /// - `StreamError::UnknownStream` - Handle does not name a stream
    /// - `StreamError::HotOnly` - Cold streams complete on their own
    /// - `StreamError::StreamClosed` - Stream was already closed
    pub fn close(&mut self, stream: StreamId) -> Result<usize, StreamError> {
        let entry = self
            .streams
            .get_mut(stream.as_u32() as usize)
            .ok_or(StreamError::UnknownStream { stream })?;
        if entry.closed {
            return Err(StreamError::StreamClosed { stream });
        }
        let StreamSource::Hot { broadcaster } = &mut entry.source else {
            return Err(StreamError::HotOnly {
                stream,
                operation: "close",
            });
        };

        entry.closed = true;
        let subscribers = broadcaster.take_all();
        for id in &subscribers {
            if let Some(sub) = self.subscriptions.get_mut(id.as_u32() as usize) {
                sub.mark_completion_pending();
            }
            self.wakeups.push(Wakeup {
                subscription: *id,
                cause: WakeCause::Closed,
            });
        }

        debug!("Closed {} with {} subscribers", stream, subscribers.len());
        Ok(subscribers.len())
    }

    /// Hands the next event of a subscription to its consumer.
    ///
    /// # Errors
    ///
    /// - `StreamError::UnknownSubscription` - Handle does not name a subscription
    pub fn next(&mut self, subscription: SubscriptionId) -> Result<NextEvent<T>, StreamError> {
        self.subscriptions
            .get_mut(subscription.as_u32() as usize)
            .map(StreamSubscription::take_next)
            .ok_or(StreamError::UnknownSubscription { subscription })
    }

    /// Returns true when `next` would not return [`NextEvent::Pending`].
    pub fn is_ready(&self, subscription: SubscriptionId) -> bool {
        self.subscription(subscription).is_some_and(|sub| {
            sub.state() != SubscriptionState::Active
                || sub.pending_len() > 0
                || sub.is_completion_pending()
        })
    }

    /// Values enqueued but not yet consumed.
    pub fn unconsumed(&self, subscription: SubscriptionId) -> Vec<T> {
        self.subscription(subscription)
            .map(|sub| sub.peek_all().cloned().collect())
            .unwrap_or_default()
    }

    /// Drains readiness changes accumulated since the last call, oldest first.
    pub fn take_wakeups(&mut self) -> Vec<Wakeup> {
        std::mem::take(&mut self.wakeups)
    }

    /// Returns producer-facing push handle for a hot stream.
    pub fn push_service(&mut self, stream: StreamId) -> HotPush<'_, T> {
        HotPush::new(self, stream)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn assets(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn drain_all(registry: &mut StreamRegistry<String>, sub: SubscriptionId) -> Vec<String> {
        let mut observed = Vec::new();
        while let NextEvent::Value(value) = registry.next(sub).unwrap() {
            observed.push(value);
        }
        observed
    }

    #[test]
    fn test_cold_stream_replays_independently() {
        let mut registry = StreamRegistry::new();
        let stream = registry.create_cold(assets(&["Asset1", "Asset2"]));

        let first = registry.subscribe(stream).unwrap();
        assert_eq!(registry.next(first).unwrap(), NextEvent::Value("Asset1".into()));

        let second = registry.subscribe(stream).unwrap();
        assert_eq!(drain_all(&mut registry, second), assets(&["Asset1", "Asset2"]));
        assert_eq!(drain_all(&mut registry, first), assets(&["Asset2"]));
        assert_eq!(registry.next(first).unwrap(), NextEvent::Completed);
        assert_eq!(registry.next(second).unwrap(), NextEvent::Completed);
    }

    #[test]
    fn test_hot_stream_has_no_backward_replay() {
        let mut registry: StreamRegistry<String> = StreamRegistry::new();
        let stream = registry.create_hot();

        let outcome = registry.emit(stream, "Asset1".into()).unwrap();
        assert!(outcome.is_dropped());

        let sub = registry.subscribe(stream).unwrap();
        assert_eq!(registry.next(sub).unwrap(), NextEvent::Pending);

        registry.emit(stream, "Asset2".into()).unwrap();
        assert_eq!(registry.next(sub).unwrap(), NextEvent::Value("Asset2".into()));
    }

    #[test]
    fn test_hot_emit_wakes_subscribers_in_registration_order() {
        let mut registry: StreamRegistry<String> = StreamRegistry::new();
        let stream = registry.create_hot();
        let a = registry.subscribe(stream).unwrap();
        let b = registry.subscribe(stream).unwrap();

        let outcome = registry.emit(stream, "Asset1".into()).unwrap();

        assert_eq!(outcome.delivered, 2);
        let woken: Vec<_> = registry
            .take_wakeups()
            .into_iter()
            .map(|w| w.subscription)
            .collect();
        assert_eq!(woken, vec![a, b]);
        assert!(registry.take_wakeups().is_empty());
    }

    #[test]
    fn test_cancel_is_final_and_double_cancel_is_rejected() {
        let mut registry: StreamRegistry<String> = StreamRegistry::new();
        let stream = registry.create_hot();
        let sub = registry.subscribe(stream).unwrap();
        registry.emit(stream, "Asset1".into()).unwrap();

        assert_eq!(registry.cancel(sub).unwrap(), 1);
        let outcome = registry.emit(stream, "Asset2".into()).unwrap();

        assert!(outcome.is_dropped());
        assert_eq!(registry.next(sub).unwrap(), NextEvent::Cancelled);
        assert_eq!(
            registry.cancel(sub),
            Err(StreamError::AlreadyCancelled { subscription: sub })
        );
    }

    #[test]
    fn test_subscriber_count_tracks_broadcast_registrations() {
        let mut registry = StreamRegistry::new();
        let hot = registry.create_hot();
        let cold = registry.create_cold(assets(&["Asset1"]));
        let first = registry.subscribe(hot).unwrap();
        registry.subscribe(hot).unwrap();
        registry.subscribe(cold).unwrap();

        assert_eq!(registry.stream(hot).unwrap().subscriber_count(), 2);
        assert_eq!(registry.stream(cold).unwrap().subscriber_count(), 0);

        registry.cancel(first).unwrap();
        assert_eq!(registry.stream(hot).unwrap().subscriber_count(), 1);
        registry.close(hot).unwrap();
        assert_eq!(registry.stream(hot).unwrap().subscriber_count(), 0);
    }

    #[test]
    fn test_owner_cannot_subscribe_twice() {
        let mut registry = StreamRegistry::<String>::new();
        let stream = registry.create_hot();
        let owner = OwnerId(7);
        let first = registry.subscribe_owned(stream, owner).unwrap();

        let result = registry.subscribe_owned(stream, owner);
        assert_eq!(
            result,
            Err(StreamError::AlreadySubscribed {
                stream,
                owner,
                existing: first,
            })
        );

        registry.cancel(first).unwrap();
        assert!(registry.subscribe_owned(stream, owner).is_ok());
    }

    #[test]
    fn test_close_completes_after_queue_drains() {
        let mut registry: StreamRegistry<String> = StreamRegistry::new();
        let stream = registry.create_hot();
        let sub = registry.subscribe(stream).unwrap();
        registry.emit(stream, "Asset1".into()).unwrap();

        assert_eq!(registry.close(stream).unwrap(), 1);
        assert_eq!(
            registry.emit(stream, "Asset2".into()),
            Err(StreamError::StreamClosed { stream })
        );
        assert_eq!(registry.next(sub).unwrap(), NextEvent::Value("Asset1".into()));
        assert_eq!(registry.next(sub).unwrap(), NextEvent::Completed);
    }

    #[test]
    fn test_cold_stream_rejects_hot_operations() {
        let mut registry = StreamRegistry::new();
        let stream = registry.create_cold(assets(&["Asset1"]));

        assert!(matches!(
            registry.emit(stream, "Asset2".into()),
            Err(StreamError::HotOnly { operation: "emit", .. })
        ));
        assert!(matches!(
            registry.close(stream),
            Err(StreamError::HotOnly { operation: "close", .. })
        ));
        assert_eq!(registry.stream(stream).unwrap().replay_values().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_handles_are_reported() {
        let mut registry = StreamRegistry::<String>::new();
        let stream = StreamId::new(3);
        let sub = SubscriptionId::new(9);

        assert_eq!(
            registry.subscribe(stream),
            Err(StreamError::UnknownStream { stream })
        );
        assert_eq!(
            registry.next(sub),
            Err(StreamError::UnknownSubscription { subscription: sub })
        );
    }

    proptest! {
        #[test]
        fn test_cancel_discards_exactly_the_unread_values(emitted in 0usize..20, read in 0usize..20) {
            let mut registry = StreamRegistry::new();
            let stream = registry.create_hot();
            let sub = registry.subscribe(stream).unwrap();
            for value in 0..emitted {
                registry.emit(stream, value).unwrap();
            }
            for _ in 0..read.min(emitted) {
                registry.next(sub).unwrap();
            }

            let discarded = registry.cancel(sub).unwrap();

            prop_assert_eq!(discarded, emitted - read.min(emitted));
            prop_assert!(registry.unconsumed(sub).is_empty());
        }
    }
}
