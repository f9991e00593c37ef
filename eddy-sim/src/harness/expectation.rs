//! Expectation and producer scripts.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Single assertion consumed in order against a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Expectation<T> {
    /// Next event is this value
    Value(T),
    /// Next event is the end of the stream
    Completion,
    /// Nothing arrives for this much virtual time
    Timeout(Duration),
    /// Cancel the subscription and stop checking
    IgnoreRemaining,
}

impl<T: fmt::Debug> fmt::Display for Expectation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Value(value) => write!(f, "value({value:?})"),
            Expectation::Completion => write!(f, "completion"),
            Expectation::Timeout(window) => write!(f, "timeout({}ms)", window.as_millis()),
            Expectation::IgnoreRemaining => write!(f, "ignore remaining"),
        }
    }
}

/// Ordered assertions for one consumer.
///
/// ```
/// use eddy_sim::harness::ExpectationScript;
///
/// let script = ExpectationScript::new()
///     .value("Asset1")
///     .value("Asset2")
///     .completion();
/// assert_eq!(script.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectationScript<T> {
    steps: Vec<Expectation<T>>,
}

impl<T> Default for ExpectationScript<T> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<T> ExpectationScript<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, value: T) -> Self {
        self.steps.push(Expectation::Value(value));
        self
    }

    /// Expects each value in order.
    pub fn values(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.steps.extend(values.into_iter().map(Expectation::Value));
        self
    }

    pub fn completion(mut self) -> Self {
        self.steps.push(Expectation::Completion);
        self
    }

    /// Expects silence for `window` of virtual time.
    pub fn timeout(mut self, window: Duration) -> Self {
        self.steps.push(Expectation::Timeout(window));
        self
    }

    pub fn ignore_remaining(mut self) -> Self {
        self.steps.push(Expectation::IgnoreRemaining);
        self
    }

    pub fn steps(&self) -> &[Expectation<T>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns true when the script asserts the end of the stream.
    pub fn expects_completion(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step, Expectation::Completion))
    }
}

impl<T> From<Vec<Expectation<T>>> for ExpectationScript<T> {
    fn from(steps: Vec<Expectation<T>>) -> Self {
        Self { steps }
    }
}

/// Single producer instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProducerStep<T> {
    /// Push a value through the stream's push service
    Emit(T),
    /// Sleep for this much virtual time
    Advance(Duration),
    /// Close the stream, completing every subscriber
    Close,
}

impl<T: fmt::Debug> fmt::Display for ProducerStep<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProducerStep::Emit(value) => write!(f, "emit({value:?})"),
            ProducerStep::Advance(delay) => write!(f, "advance({}ms)", delay.as_millis()),
            ProducerStep::Close => write!(f, "close"),
        }
    }
}

/// Ordered emissions for the producer task of a hot stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProducerScript<T> {
    steps: Vec<ProducerStep<T>>,
}

impl<T> Default for ProducerScript<T> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<T> ProducerScript<T> {
    /// Creates an empty script; an empty script spawns no producer.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(mut self, value: T) -> Self {
        self.steps.push(ProducerStep::Emit(value));
        self
    }

    pub fn emit_all(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.steps.extend(values.into_iter().map(ProducerStep::Emit));
        self
    }

    pub fn advance(mut self, delay: Duration) -> Self {
        self.steps.push(ProducerStep::Advance(delay));
        self
    }

    pub fn close(mut self) -> Self {
        self.steps.push(ProducerStep::Close);
        self
    }

    pub fn steps(&self) -> &[ProducerStep<T>] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<T> From<Vec<ProducerStep<T>>> for ProducerScript<T> {
    fn from(steps: Vec<ProducerStep<T>>) -> Self {
        Self { steps }
    }
}
