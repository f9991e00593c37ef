//! Producer-facing push integration point.

use std::fmt;

use crate::stream::{EmitOutcome, StreamError, StreamId, StreamRegistry};

/// The one call surrounding components make to feed a hot stream.
pub trait PushService<T> {
    /// Forwards `value` to every current subscriber.
    ///
    /// # Errors
    ///
    /// - `StreamError` - Target stream is unknown, cold, or closed
    fn push(&mut self, value: T) -> Result<EmitOutcome, StreamError>;
}

/// Push handle for a hot stream in a [`StreamRegistry`].
pub struct HotPush<'a, T> {
    registry: &'a mut StreamRegistry<T>,
    stream: StreamId,
}

impl<'a, T> HotPush<'a, T> {
    pub(crate) fn new(registry: &'a mut StreamRegistry<T>, stream: StreamId) -> Self {
        Self { registry, stream }
    }

    /// Returns the stream this handle pushes into.
    pub fn stream(&self) -> StreamId {
        self.stream
    }
}

impl<T: Clone + fmt::Debug> PushService<T> for HotPush<'_, T> {
    fn push(&mut self, value: T) -> Result<EmitOutcome, StreamError> {
        self.registry.emit(self.stream, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::NextEvent;

    #[test]
    fn test_push_forwards_to_broadcaster() {
        let mut registry = StreamRegistry::new();
        let stream = registry.create_hot();
        let sub = registry.subscribe(stream).unwrap();

        let outcome = registry.push_service(stream).push("Asset1").unwrap();

        assert_eq!(outcome.delivered, 1);
        assert_eq!(registry.next(sub).unwrap(), NextEvent::Value("Asset1"));
    }

    #[test]
    fn test_push_into_cold_stream_is_rejected() {
        let mut registry = StreamRegistry::new();
        let stream = registry.create_cold(["Asset1"]);

        let result = registry.push_service(stream).push("Asset2");

        assert!(matches!(result, Err(StreamError::HotOnly { .. })));
    }
}
