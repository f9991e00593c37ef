//! Ordered record of every scheduling decision in a run.

use std::fmt;

use eddy_core::{StreamId, SubscriptionId};
use serde::Serialize;

use super::clock::VirtualInstant;
use super::scheduler::StallReason;
use super::task::{TaskId, WaitCondition};

/// Renders a stream value for the trace.
pub fn render_value<T: fmt::Debug>(value: &T) -> String {
    format!("{value:?}")
}

/// Why a suspended task became runnable again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WakeReason {
    Data,
    Closed,
    Cancelled,
    Deadline,
}

impl fmt::Display for WakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeReason::Data => write!(f, "data"),
            WakeReason::Closed => write!(f, "stream closed"),
            WakeReason::Cancelled => write!(f, "subscription cancelled"),
            WakeReason::Deadline => write!(f, "deadline reached"),
        }
    }
}

/// Something that happened during a run.
///
/// Values are recorded in their `Debug` rendering so traces compare equal
/// independently of the stream's item type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    Spawned {
        task: TaskId,
        name: String,
    },
    Ran {
        task: TaskId,
    },
    Suspended {
        task: TaskId,
        condition: WaitCondition,
    },
    Woken {
        task: TaskId,
        reason: WakeReason,
    },
    Completed {
        task: TaskId,
    },
    Failed {
        task: TaskId,
        reason: String,
    },
    Subscribed {
        task: Option<TaskId>,
        stream: StreamId,
        subscription: SubscriptionId,
    },
    Received {
        task: TaskId,
        subscription: SubscriptionId,
        value: String,
    },
    CompletionReceived {
        task: TaskId,
        subscription: SubscriptionId,
    },
    Emitted {
        task: Option<TaskId>,
        stream: StreamId,
        value: String,
        delivered: usize,
    },
    /// Emission on a hot stream nobody listened to
    Dropped {
        task: Option<TaskId>,
        stream: StreamId,
        value: String,
    },
    Closed {
        task: Option<TaskId>,
        stream: StreamId,
        subscribers: usize,
    },
    Cancelled {
        task: Option<TaskId>,
        subscription: SubscriptionId,
        discarded: usize,
    },
    ClockAdvanced {
        from: VirtualInstant,
        to: VirtualInstant,
    },
    ExpectationMet {
        task: TaskId,
        position: usize,
        expectation: String,
    },
    ExpectationFailed {
        task: TaskId,
        position: usize,
        detail: String,
    },
    Stalled {
        reason: StallReason,
        pending: usize,
    },
    Verdict {
        summary: String,
    },
}

fn actor(task: &Option<TaskId>) -> String {
    task.map_or_else(|| "harness".to_string(), |task| task.to_string())
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Spawned { task, name } => write!(f, "{task} spawned as '{name}'"),
            TraceEvent::Ran { task } => write!(f, "{task} runs"),
            TraceEvent::Suspended { task, condition } => {
                write!(f, "{task} suspends waiting for {condition}")
            }
            TraceEvent::Woken { task, reason } => write!(f, "{task} woken: {reason}"),
            TraceEvent::Completed { task } => write!(f, "{task} completed"),
            TraceEvent::Failed { task, reason } => write!(f, "{task} failed: {reason}"),
            TraceEvent::Subscribed {
                task,
                stream,
                subscription,
            } => write!(f, "{} subscribed {subscription} to {stream}", actor(task)),
            TraceEvent::Received {
                task,
                subscription,
                value,
            } => write!(f, "{task} received {value} on {subscription}"),
            TraceEvent::CompletionReceived { task, subscription } => {
                write!(f, "{task} received completion on {subscription}")
            }
            TraceEvent::Emitted {
                task,
                stream,
                value,
                delivered,
            } => write!(
                f,
                "{} emitted {value} on {stream} to {delivered} subscribers",
                actor(task)
            ),
            TraceEvent::Dropped {
                task,
                stream,
                value,
            } => write!(
                f,
                "{} emitted {value} on {stream} with no subscribers (dropped)",
                actor(task)
            ),
            TraceEvent::Closed {
                task,
                stream,
                subscribers,
            } => write!(
                f,
                "{} closed {stream} ({subscribers} subscribers)",
                actor(task)
            ),
            TraceEvent::Cancelled {
                task,
                subscription,
                discarded,
            } => write!(
                f,
                "{} cancelled {subscription} ({discarded} values discarded)",
                actor(task)
            ),
            TraceEvent::ClockAdvanced { from, to } => write!(f, "clock advanced {from} -> {to}"),
            TraceEvent::ExpectationMet {
                task,
                position,
                expectation,
            } => write!(f, "{task} met expectation #{position}: {expectation}"),
            TraceEvent::ExpectationFailed {
                task,
                position,
                detail,
            } => write!(f, "{task} failed expectation #{position}: {detail}"),
            TraceEvent::Stalled { reason, pending } => {
                write!(f, "stalled: {reason} ({pending} tasks pending)")
            }
            TraceEvent::Verdict { summary } => write!(f, "verdict: {summary}"),
        }
    }
}

/// Single trace line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    /// Position in the run, starting at zero
    pub seq: u64,
    /// Virtual time of the event
    pub at: VirtualInstant,
    pub event: TraceEvent,
}

/// Capacity-bounded, ordered run trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trace {
    entries: Vec<TraceEntry>,
    capacity: usize,
    next_seq: u64,
    truncated: u64,
}

impl Trace {
    /// Creates trace retaining at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            next_seq: 0,
            truncated: 0,
        }
    }

    /// Appends an event; events past capacity are counted but not kept.
    pub fn record(&mut self, at: VirtualInstant, event: TraceEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.entries.len() < self.capacity {
            self.entries.push(TraceEntry { seq, at, event });
        } else {
            self.truncated += 1;
        }
    }

    /// Retained entries in order.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Iterates retained events in order.
    pub fn events(&self) -> impl Iterator<Item = &TraceEvent> {
        self.entries.iter().map(|entry| &entry.event)
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of events recorded past capacity.
    pub fn truncated(&self) -> u64 {
        self.truncated
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{:>5} {:>10}  {}", entry.seq, entry.at.to_string(), entry.event)?;
        }
        if self.truncated > 0 {
            writeln!(f, "... {} further events not retained", self.truncated)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_respects_capacity() {
        let mut trace = Trace::new(2);
        for index in 0..5 {
            trace.record(
                VirtualInstant::ZERO,
                TraceEvent::Ran {
                    task: TaskId::new(index),
                },
            );
        }

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.truncated(), 3);
        assert!(trace.to_string().contains("3 further events"));
    }

    #[test]
    fn test_trace_renders_values_with_debug() {
        let mut trace = Trace::new(10);
        trace.record(
            VirtualInstant::from_millis(5),
            TraceEvent::Emitted {
                task: None,
                stream: StreamId::new(0),
                value: render_value(&"Asset1"),
                delivered: 2,
            },
        );

        let rendered = trace.to_string();
        assert!(rendered.contains("harness emitted \"Asset1\" on stream-0 to 2 subscribers"));
        assert!(rendered.contains("t+5ms"));
    }
}
