//! Cooperative task model.
//!
//! A task is an explicit state machine. Each call to [`Task::step`] runs it
//! to its next suspension point, which it reports as a [`Step`] value
//! instead of yielding at the language level.

use std::fmt;

use eddy_core::{
    EmitOutcome, NextEvent, OwnerId, PushService, StreamError, StreamId, StreamRegistry,
    SubscriptionId,
};
use serde::Serialize;

use super::clock::{VirtualClock, VirtualInstant};
use super::trace::{Trace, TraceEvent, render_value};

/// Handle to a task owned by a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(u32);

impl TaskId {
    /// Creates task handle from raw index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns raw index.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

impl From<TaskId> for OwnerId {
    fn from(task: TaskId) -> Self {
        OwnerId(u64::from(task.0))
    }
}

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Runnable,
    Suspended,
    Completed,
    Failed,
}

impl TaskState {
    /// Returns true for Completed and Failed.
    pub fn is_finished(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// What a suspended task is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaitCondition {
    /// A value, completion or cancellation on the subscription
    Data(SubscriptionId),
    /// The virtual clock reaching the instant
    Until(VirtualInstant),
    /// Whichever of the two happens first
    DataOrDeadline {
        subscription: SubscriptionId,
        deadline: VirtualInstant,
    },
}

impl WaitCondition {
    /// Subscription this condition listens on, if any.
    pub fn subscription(&self) -> Option<SubscriptionId> {
        match self {
            WaitCondition::Data(subscription)
            | WaitCondition::DataOrDeadline { subscription, .. } => Some(*subscription),
            WaitCondition::Until(_) => None,
        }
    }

    /// Virtual deadline of this condition, if any.
    pub fn deadline(&self) -> Option<VirtualInstant> {
        match self {
            WaitCondition::Until(deadline) | WaitCondition::DataOrDeadline { deadline, .. } => {
                Some(*deadline)
            }
            WaitCondition::Data(_) => None,
        }
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::Data(subscription) => write!(f, "data on {subscription}"),
            WaitCondition::Until(deadline) => write!(f, "clock {deadline}"),
            WaitCondition::DataOrDeadline {
                subscription,
                deadline,
            } => write!(f, "data on {subscription} or clock {deadline}"),
        }
    }
}

/// Outcome of running a task to its next suspension point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Still runnable; requeue at the tail
    Yield,
    /// Park until the condition holds
    Suspend(WaitCondition),
    /// Finished normally
    Complete,
    /// Finished with an error
    Fail(String),
}

/// Unit of cooperative work driven by a scheduler.
pub trait Task<T> {
    /// Human-readable name used in traces and stall reports.
    fn name(&self) -> &str;

    /// Runs until the next suspension point.
    fn step(&mut self, cx: &mut TaskContext<'_, T>) -> Step;
}

/// Closure-backed task.
pub struct FnTask<F> {
    name: String,
    body: F,
}

impl<F> FnTask<F> {
    /// Wraps `body`; it is called once per scheduling round.
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

impl<T, F> Task<T> for FnTask<F>
where
    F: FnMut(&mut TaskContext<'_, T>) -> Step,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, cx: &mut TaskContext<'_, T>) -> Step {
        (self.body)(cx)
    }
}

/// View of the world handed to a running task.
///
/// Every stream operation is recorded in the run trace.
pub struct TaskContext<'a, T> {
    task: TaskId,
    clock: &'a VirtualClock,
    registry: &'a mut StreamRegistry<T>,
    trace: &'a mut Trace,
}

impl<'a, T: Clone + fmt::Debug> TaskContext<'a, T> {
    pub(crate) fn new(
        task: TaskId,
        clock: &'a VirtualClock,
        registry: &'a mut StreamRegistry<T>,
        trace: &'a mut Trace,
    ) -> Self {
        Self {
            task,
            clock,
            registry,
            trace,
        }
    }

    /// Returns the running task.
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Returns current virtual time.
    pub fn now(&self) -> VirtualInstant {
        self.clock.now()
    }

    /// Read-only access to streams and subscriptions.
    pub fn registry(&self) -> &StreamRegistry<T> {
        &*self.registry
    }

    /// Subscribes the running task to `stream`.
    ///
    /// # Errors
    ///
    /// - `StreamError::AlreadySubscribed` - This task holds an uncancelled subscription on `stream`
    /// - `StreamError::UnknownStream` - Handle does not name a stream
    pub fn subscribe(&mut self, stream: StreamId) -> Result<SubscriptionId, StreamError> {
        let subscription = self.registry.subscribe_owned(stream, self.task.into())?;
        self.record(TraceEvent::Subscribed {
            task: Some(self.task),
            stream,
            subscription,
        });
        Ok(subscription)
    }

    /// Takes the next event of `subscription`.
    ///
    /// [`NextEvent::Pending`] means the task should suspend on
    /// [`WaitCondition::Data`].
    ///
    /// # Errors
    ///
    /// - `StreamError::UnknownSubscription` - Handle does not name a subscription
    pub fn next(&mut self, subscription: SubscriptionId) -> Result<NextEvent<T>, StreamError> {
        let event = self.registry.next(subscription)?;
        match &event {
            NextEvent::Value(value) => self.record(TraceEvent::Received {
                task: self.task,
                subscription,
                value: render_value(value),
            }),
            NextEvent::Completed => self.record(TraceEvent::CompletionReceived {
                task: self.task,
                subscription,
            }),
            NextEvent::Cancelled | NextEvent::Pending => {}
        }
        Ok(event)
    }

    /// Broadcasts `value` on a hot stream.
    ///
    /// # Errors
    ///
    /// - `StreamError` - Stream is unknown, cold or closed
    pub fn emit(&mut self, stream: StreamId, value: T) -> Result<EmitOutcome, StreamError> {
        let rendered = render_value(&value);
        let outcome = self.registry.emit(stream, value)?;
        let event = if outcome.is_dropped() {
            TraceEvent::Dropped {
                task: Some(self.task),
                stream,
                value: rendered,
            }
        } else {
            TraceEvent::Emitted {
                task: Some(self.task),
                stream,
                value: rendered,
                delivered: outcome.delivered,
            }
        };
        self.record(event);
        Ok(outcome)
    }

    /// Returns a push service feeding `stream` from this task.
    pub fn push_service(&mut self, stream: StreamId) -> TaskPush<'_, 'a, T> {
        TaskPush { cx: self, stream }
    }

    /// Closes a hot stream.
    ///
    /// # Errors
    ///
    /// - `StreamError` - Stream is unknown, cold or already closed
    pub fn close(&mut self, stream: StreamId) -> Result<usize, StreamError> {
        let subscribers = self.registry.close(stream)?;
        self.record(TraceEvent::Closed {
            task: Some(self.task),
            stream,
            subscribers,
        });
        Ok(subscribers)
    }

    /// Cancels `subscription`.
    ///
    /// # Errors
    ///
    /// - `StreamError::AlreadyCancelled` - Subscription was cancelled before
    /// - `StreamError::UnknownSubscription` - Handle does not name a subscription
    pub fn cancel(&mut self, subscription: SubscriptionId) -> Result<usize, StreamError> {
        let discarded = self.registry.cancel(subscription)?;
        self.record(TraceEvent::Cancelled {
            task: Some(self.task),
            subscription,
            discarded,
        });
        Ok(discarded)
    }

    /// Appends a custom event to the run trace.
    pub fn record(&mut self, event: TraceEvent) {
        self.trace.record(self.clock.now(), event);
    }
}

/// Push service bound to a running task and a hot stream.
pub struct TaskPush<'c, 'a, T> {
    cx: &'c mut TaskContext<'a, T>,
    stream: StreamId,
}

impl<T: Clone + fmt::Debug> PushService<T> for TaskPush<'_, '_, T> {
    fn push(&mut self, value: T) -> Result<EmitOutcome, StreamError> {
        self.cx.emit(self.stream, value)
    }
}
