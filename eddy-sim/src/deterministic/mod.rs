//! Deterministic virtual-time execution for stream tests.
//!
//! This module provides a cooperative scheduler over a stream registry: tasks
//! are explicit state machines, time moves only when told to, and a run ends
//! either quiescent or with a reproducible stall report instead of hanging.

mod clock;
mod scheduler;
mod task;
mod trace;

// Re-export core types for public API
pub use clock::{DeterministicRng, VirtualClock, VirtualInstant};
pub use scheduler::{
    CooperativeScheduler, PendingTask, RunOutcome, SimulationError, StallReason, StallReport,
};
pub use task::{FnTask, Step, Task, TaskContext, TaskId, TaskPush, TaskState, WaitCondition};
pub use trace::{Trace, TraceEntry, TraceEvent, WakeReason, render_value};

#[cfg(test)]
mod tests;
