//! Eddy Core - Replayable and multicast event streams
//!
//! This crate provides the data-flow primitives exercised by the Eddy
//! simulation harness: cold streams that replay a fixed sequence to every
//! subscriber, hot streams that broadcast only to current listeners, the
//! push integration point producers call, and a thread-safe variant of the
//! same semantics for real concurrent use.

pub mod config;
pub mod push;
pub mod shared;
pub mod stream;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::{ConfigError, EddyConfig, HarnessConfig, SchedulerConfig};
pub use push::{HotPush, PushService};
pub use shared::{SharedBroadcaster, SharedStream, SharedSubscription};
pub use stream::{
    Broadcaster, EmitOutcome, EventStream, NextEvent, OwnerId, StreamError, StreamId,
    StreamMode, StreamRegistry, StreamSubscription, SubscriptionId, SubscriptionState,
    WakeCause, Wakeup,
};

/// Errors that can bubble up from any Eddy core subsystem.
#[derive(Debug, thiserror::Error)]
pub enum EddyError {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl EddyError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            EddyError::Stream(StreamError::AlreadySubscribed { owner, stream, .. }) => {
                format!("{owner} subscribed to {stream} twice without cancelling")
            }
            EddyError::Stream(StreamError::AlreadyCancelled { subscription }) => {
                format!("{subscription} was cancelled twice")
            }
            EddyError::Stream(_) => "Stream misuse detected".to_string(),
            EddyError::Configuration(e) => e.to_string(),
        }
    }

    /// Checks if this error is caller misuse rather than an environment problem.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, EddyError::Stream(_))
    }
}

pub type Result<T> = std::result::Result<T, EddyError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn double_cancel() -> Result<()> {
        let mut registry: StreamRegistry<u8> = StreamRegistry::new();
        let stream = registry.create_hot();
        let sub = registry.subscribe(stream)?;
        registry.cancel(sub)?;
        registry.cancel(sub)?;
        Ok(())
    }

    #[test]
    fn test_stream_misuse_converts_into_eddy_error() {
        let error = double_cancel().unwrap_err();

        assert!(error.is_precondition_violation());
        assert_eq!(error.user_message(), "sub-0 was cancelled twice");
    }

    #[test]
    fn test_configuration_error_is_not_stream_misuse() {
        let mut config = EddyConfig::default();
        config.scheduler.round_quota = 0;

        let error = EddyError::from(config.validate().unwrap_err());

        assert!(!error.is_precondition_violation());
        assert!(error.user_message().contains("round_quota"));
    }
}
