//! Multicast engine behind hot streams.

use super::{StreamSubscription, SubscriptionId};

/// Ordered set of live subscriptions for one hot stream.
///
/// Registration order is delivery order. The broadcaster holds no values:
/// an emission either lands in the queues of the subscribers present at
/// that instant or is lost.
#[derive(Debug, Default)]
pub struct Broadcaster {
    subscribers: Vec<SubscriptionId>,
}

impl Broadcaster {
    /// Creates broadcaster with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers subscription at the tail of the delivery order.
    pub fn register(&mut self, subscription: SubscriptionId) {
        if !self.subscribers.contains(&subscription) {
            self.subscribers.push(subscription);
        }
    }

    /// Removes subscription. Returns false if it was not registered.
    pub fn unregister(&mut self, subscription: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|id| *id != subscription);
        self.subscribers.len() != before
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns true when nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Removes and returns every subscription, in delivery order.
    pub fn take_all(&mut self) -> Vec<SubscriptionId> {
        std::mem::take(&mut self.subscribers)
    }

    /// Enqueues `value` on every registered subscription.
    ///
    /// `arena` is indexed by [`SubscriptionId`]. Returns the subscriptions that
    /// accepted the value, in registration order.
    pub fn emit<T: Clone>(
        &self,
        value: T,
        arena: &mut [StreamSubscription<T>],
    ) -> Vec<SubscriptionId> {
        let mut delivered = Vec::with_capacity(self.subscribers.len());
        let Some((last, rest)) = self.subscribers.split_last() else {
            return delivered;
        };

        for id in rest {
            if let Some(sub) = arena.get_mut(id.as_u32() as usize)
                && sub.enqueue(value.clone())
            {
                delivered.push(*id);
            }
        }
        if let Some(sub) = arena.get_mut(last.as_u32() as usize)
            && sub.enqueue(value)
        {
            delivered.push(*last);
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{NextEvent, StreamId};

    fn arena(count: u32) -> Vec<StreamSubscription<String>> {
        (0..count)
            .map(|i| StreamSubscription::new(SubscriptionId::new(i), StreamId::new(0), None))
            .collect()
    }

    #[test]
    fn test_emit_without_subscribers_is_lost() {
        let broadcaster = Broadcaster::new();
        let mut subs = arena(1);

        let delivered = broadcaster.emit("Asset1".to_string(), &mut subs);

        assert!(delivered.is_empty());
        assert_eq!(subs[0].pending_len(), 0);
    }

    #[test]
    fn test_emit_follows_registration_order() {
        let mut broadcaster = Broadcaster::new();
        let mut subs = arena(3);
        broadcaster.register(SubscriptionId::new(2));
        broadcaster.register(SubscriptionId::new(0));

        let delivered = broadcaster.emit("Asset1".to_string(), &mut subs);

        assert_eq!(delivered, vec![SubscriptionId::new(2), SubscriptionId::new(0)]);
        assert_eq!(subs[1].pending_len(), 0);
        assert_eq!(subs[2].take_next(), NextEvent::Value("Asset1".to_string()));
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let mut broadcaster = Broadcaster::new();
        let mut subs = arena(2);
        broadcaster.register(SubscriptionId::new(0));
        broadcaster.register(SubscriptionId::new(1));

        assert!(broadcaster.unregister(SubscriptionId::new(0)));
        assert!(!broadcaster.unregister(SubscriptionId::new(0)));
        broadcaster.emit("Asset1".to_string(), &mut subs);

        assert_eq!(subs[0].pending_len(), 0);
        assert_eq!(subs[1].pending_len(), 1);
        assert_eq!(broadcaster.len(), 1);
    }
}
