//! Verdicts and reports produced by the stream test harness.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::expectation::Expectation;
use crate::deterministic::{StallReport, Trace, VirtualInstant};

/// Category of a failed run, without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    ValueMismatch,
    PrematureCompletion,
    UnexpectedContinuation,
    UnexpectedEvent,
    UnconsumedValues,
    TaskFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::ValueMismatch => "value mismatch",
            FailureKind::PrematureCompletion => "premature completion",
            FailureKind::UnexpectedContinuation => "unexpected continuation",
            FailureKind::UnexpectedEvent => "unexpected event",
            FailureKind::UnconsumedValues => "unconsumed values",
            FailureKind::TaskFailed => "task failed",
        };
        f.write_str(label)
    }
}

/// Assertion failure found by a consumer, or a failed task.
///
/// `consumer` is the index of the expectation script in the run and
/// `position` the index of the assertion inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Failure<T> {
    /// Observed value differs from the expected one
    ValueMismatch {
        consumer: usize,
        position: usize,
        expected: T,
        actual: T,
    },

    /// Stream ended while the script still expected something else
    PrematureCompletion {
        consumer: usize,
        position: usize,
        expected: Expectation<T>,
    },

    /// Stream produced a value where completion was expected
    UnexpectedContinuation {
        consumer: usize,
        position: usize,
        actual: T,
    },

    /// Something arrived during an expected silence; `None` is completion
    UnexpectedEvent {
        consumer: usize,
        position: usize,
        window: Duration,
        actual: Option<T>,
    },

    /// Values left unread after the script was exhausted
    UnconsumedValues { consumer: usize, values: Vec<T> },

    /// Task stopped with an error instead of finishing its script
    TaskFailed { task: String, reason: String },
}

impl<T> Failure<T> {
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::ValueMismatch { .. } => FailureKind::ValueMismatch,
            Failure::PrematureCompletion { .. } => FailureKind::PrematureCompletion,
            Failure::UnexpectedContinuation { .. } => FailureKind::UnexpectedContinuation,
            Failure::UnexpectedEvent { .. } => FailureKind::UnexpectedEvent,
            Failure::UnconsumedValues { .. } => FailureKind::UnconsumedValues,
            Failure::TaskFailed { .. } => FailureKind::TaskFailed,
        }
    }

    /// Script position of the failed assertion, if the failure has one.
    pub fn position(&self) -> Option<usize> {
        match self {
            Failure::ValueMismatch { position, .. }
            | Failure::PrematureCompletion { position, .. }
            | Failure::UnexpectedContinuation { position, .. }
            | Failure::UnexpectedEvent { position, .. } => Some(*position),
            Failure::UnconsumedValues { .. } | Failure::TaskFailed { .. } => None,
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Failure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::ValueMismatch {
                consumer,
                position,
                expected,
                actual,
            } => write!(
                f,
                "consumer {consumer} #{position}: expected {expected:?}, got {actual:?}"
            ),
            Failure::PrematureCompletion {
                consumer,
                position,
                expected,
            } => write!(
                f,
                "consumer {consumer} #{position}: stream completed while expecting {expected}"
            ),
            Failure::UnexpectedContinuation {
                consumer,
                position,
                actual,
            } => write!(
                f,
                "consumer {consumer} #{position}: expected completion, got {actual:?}"
            ),
            Failure::UnexpectedEvent {
                consumer,
                position,
                window,
                actual,
            } => match actual {
                Some(value) => write!(
                    f,
                    "consumer {consumer} #{position}: expected no event for {}ms, got {value:?}",
                    window.as_millis()
                ),
                None => write!(
                    f,
                    "consumer {consumer} #{position}: expected no event for {}ms, got completion",
                    window.as_millis()
                ),
            },
            Failure::UnconsumedValues { consumer, values } => {
                write!(f, "consumer {consumer}: unconsumed values {values:?}")
            }
            Failure::TaskFailed { task, reason } => write!(f, "task '{task}' failed: {reason}"),
        }
    }
}

/// Outcome of a harness run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Verdict<T> {
    Pass,
    Fail(Failure<T>),
    /// The run would have hung
    Stalled(StallReport),
}

impl<T> Verdict<T> {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self, Verdict::Stalled(_))
    }

    pub fn failure(&self) -> Option<&Failure<T>> {
        match self {
            Verdict::Fail(failure) => Some(failure),
            _ => None,
        }
    }

    /// Returns failure category for failed runs.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure().map(Failure::kind)
    }

    /// Short label: "pass", "fail" or "stalled".
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail(_) => "fail",
            Verdict::Stalled(_) => "stalled",
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Verdict<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail(failure) => write!(f, "FAIL ({}): {failure}", failure.kind()),
            Verdict::Stalled(report) => write!(f, "STALLED: {report}"),
        }
    }
}

/// Verdict plus everything needed to explain it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarnessReport<T> {
    pub verdict: Verdict<T>,
    /// Values each consumer received, in script order
    pub observed: Vec<Vec<T>>,
    /// Scheduling rounds executed
    pub rounds: u64,
    /// Virtual time when the run ended
    pub finished_at: VirtualInstant,
    pub trace: Trace,
}

impl<T: fmt::Debug> HarnessReport<T> {
    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!("Verdict: {}\n", self.verdict));
        summary.push_str(&format!("Rounds: {}\n", self.rounds));
        summary.push_str(&format!("Finished at: {}\n", self.finished_at));
        for (consumer, values) in self.observed.iter().enumerate() {
            summary.push_str(&format!("  consumer {consumer} observed {values:?}\n"));
        }
        if self.trace.truncated() > 0 {
            summary.push_str(&format!(
                "Trace truncated: {} events not retained\n",
                self.trace.truncated()
            ));
        }
        summary
    }
}

impl<T: Serialize> HarnessReport<T> {
    /// Serializes the report, trace included, as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// - `serde_json::Error` - A value failed to serialize
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_names_position_and_values() {
        let failure = Failure::ValueMismatch {
            consumer: 0,
            position: 1,
            expected: "Asset2",
            actual: "Asset3",
        };

        assert_eq!(failure.kind(), FailureKind::ValueMismatch);
        assert_eq!(failure.position(), Some(1));
        assert_eq!(
            Verdict::Fail(failure).to_string(),
            "FAIL (value mismatch): consumer 0 #1: expected \"Asset2\", got \"Asset3\""
        );
    }

    #[test]
    fn test_verdict_labels() {
        assert_eq!(Verdict::<u8>::Pass.label(), "pass");
        assert!(Verdict::<u8>::Pass.failure_kind().is_none());
        let unconsumed: Verdict<u8> = Verdict::Fail(Failure::UnconsumedValues {
            consumer: 0,
            values: vec![3],
        });
        assert_eq!(unconsumed.failure_kind(), Some(FailureKind::UnconsumedValues));
        assert_eq!(unconsumed.label(), "fail");
    }
}
