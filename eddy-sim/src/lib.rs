//! Eddy Simulation - Deterministic virtual-time testing for event streams

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! This crate drives the stream primitives of `eddy-core` on a single logical
//! thread so that stream tests are reproducible and a test that would hang
//! is reported instead of hanging.
//!
//! # Features
//!
//! - **Virtual Time**: Clock moves only when told to, or jumps to the next deadline when idle
//! - **Cooperative Tasks**: Explicit state machines stepped in a deterministic order
//! - **Stall Detection**: Runs end `Quiescent` or with a `StallReport` naming every waiter
//! - **Expectation Scripts**: expect-value, expect-completion, expect-timeout, ignore-remaining
//! - **Full Traces**: Every scheduling decision recorded for post-mortem reading
//!
//! # Example
//!
//! ```rust
//! use eddy_sim::harness::{ExpectationScript, ProducerScript, StreamSpec, StreamTestHarness};
//!
//! let harness = StreamTestHarness::default();
//! let report = harness
//!     .run(
//!         StreamSpec::Hot,
//!         ProducerScript::new().emit("Asset1"),
//!         ExpectationScript::new().value("Asset1").value("Asset2"),
//!     )
//!     .unwrap();
//!
//! // Only one value was ever pushed, so the consumer would wait forever.
//! assert!(report.verdict.is_stalled());
//! ```
//!
//! # Architecture
//!
//! - **deterministic**: Virtual clock, task model, cooperative scheduler and trace
//! - **harness**: Scripted consumers and producers, verdicts and reports
//! - **scenarios**: Built-in scenarios and seeded scenario generation

pub mod deterministic;
pub mod harness;
pub mod scenarios;

// Re-export core types for convenience
pub use deterministic::{
    CooperativeScheduler, DeterministicRng, FnTask, RunOutcome, SimulationError, StallReason,
    StallReport, Step, Task, TaskContext, TaskId, TaskState, Trace, TraceEvent, VirtualClock,
    VirtualInstant, WaitCondition,
};
pub use harness::{
    Expectation, ExpectationScript, Failure, FailureKind, HarnessError, HarnessReport,
    ProducerScript, ProducerStep, StreamSpec, StreamTestHarness, Verdict,
};
pub use scenarios::{
    ExpectedVerdict, Scenario, ScenarioOutcome, builtin_scenarios, find_scenario,
    random_hot_scenario,
};
