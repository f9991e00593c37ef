//! Cooperative virtual-time scheduler.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use eddy_core::config::SchedulerConfig;
use eddy_core::{
    EmitOutcome, StreamError, StreamId, StreamRegistry, SubscriptionId, SubscriptionState,
    WakeCause,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::clock::{VirtualClock, VirtualInstant};
use super::task::{Step, Task, TaskContext, TaskId, TaskState, WaitCondition};
use super::trace::{Trace, TraceEvent, WakeReason, render_value};

/// Errors that can occur while driving a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Single clock advance exceeded the allowed maximum
    #[error("Time advance too large: {requested:?}")]
    TimeAdvanceTooLarge {
        /// Duration that was requested
        requested: Duration,
    },

    /// Clock was asked to move to an earlier instant
    #[error("Clock cannot go backwards from {current} to {target}")]
    ClockWentBackwards {
        current: VirtualInstant,
        target: VirtualInstant,
    },

    /// Handle does not name a task of this scheduler
    #[error("Unknown task: {task}")]
    UnknownTask { task: TaskId },

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Why a run ended with unfinished tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StallReason {
    /// Nothing is runnable and every waiter needs data that nobody will send
    PendingWaitConditions,
    /// Round quota ran out while work remained
    QuotaExhausted,
    /// Only deadline waits remain and automatic time advance is off
    AwaitingTimeAdvance,
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StallReason::PendingWaitConditions => write!(f, "pending wait conditions"),
            StallReason::QuotaExhausted => write!(f, "round quota exhausted"),
            StallReason::AwaitingTimeAdvance => write!(f, "awaiting time advance"),
        }
    }
}

/// Unfinished task at the moment a run stalled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTask {
    pub task: TaskId,
    pub name: String,
    /// `None` when the task was still runnable
    pub condition: Option<WaitCondition>,
}

impl fmt::Display for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            Some(condition) => write!(f, "{} '{}' waiting for {}", self.task, self.name, condition),
            None => write!(f, "{} '{}' runnable", self.task, self.name),
        }
    }
}

/// Deterministic description of a hang.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StallReport {
    pub reason: StallReason,
    /// Unfinished tasks ordered by task id
    pub pending: Vec<PendingTask>,
    /// Rounds executed before the stall
    pub rounds: u64,
    /// Virtual time of the stall
    pub at: VirtualInstant,
}

impl fmt::Display for StallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stalled after {} rounds at {} ({})",
            self.rounds, self.at, self.reason
        )?;
        for pending in &self.pending {
            write!(f, "; {pending}")?;
        }
        Ok(())
    }
}

/// How a call to [`CooperativeScheduler::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Every task finished
    Quiescent { rounds: u64 },
    Stalled(StallReport),
}

impl RunOutcome {
    /// Returns true when every task finished.
    pub fn is_quiescent(&self) -> bool {
        matches!(self, RunOutcome::Quiescent { .. })
    }
}

struct TaskSlot<T> {
    name: String,
    task: Option<Box<dyn Task<T>>>,
    state: TaskState,
    failure: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Waiter {
    task: TaskId,
    condition: WaitCondition,
    /// Registration order, breaks ties between equal deadlines
    seq: u64,
}

/// Runs cooperative tasks over a stream registry in virtual time.
///
/// Construct one per test run; all state, including the clock and trace,
/// belongs to the instance.
pub struct CooperativeScheduler<T> {
    config: SchedulerConfig,
    clock: VirtualClock,
    registry: StreamRegistry<T>,
    tasks: Vec<TaskSlot<T>>,
    ready: VecDeque<TaskId>,
    waiting: Vec<Waiter>,
    next_wait_seq: u64,
    rounds: u64,
    trace: Trace,
}

impl<T: Clone + fmt::Debug + 'static> CooperativeScheduler<T> {
    /// Creates scheduler with an empty registry at logical zero.
    pub fn new(config: SchedulerConfig) -> Self {
        let trace = Trace::new(config.trace_capacity);
        Self {
            config,
            clock: VirtualClock::new(),
            registry: StreamRegistry::new(),
            tasks: Vec::new(),
            ready: VecDeque::new(),
            waiting: Vec::new(),
            next_wait_seq: 0,
            rounds: 0,
            trace,
        }
    }

    pub fn registry(&self) -> &StreamRegistry<T> {
        &self.registry
    }

    /// Mutable registry access for setup; wakeups it produces are picked up by the next run.
    pub fn registry_mut(&mut self) -> &mut StreamRegistry<T> {
        &mut self.registry
    }

    pub fn now(&self) -> VirtualInstant {
        self.clock.now()
    }

    /// Total rounds executed so far.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn into_trace(self) -> Trace {
        self.trace
    }

    /// Appends a harness-level event to the trace.
    pub fn note(&mut self, event: TraceEvent) {
        self.trace.record(self.clock.now(), event);
    }

    /// Queues `task` at the tail of the ready queue.
    pub fn spawn(&mut self, task: impl Task<T> + 'static) -> TaskId {
        let id = TaskId::new(self.tasks.len() as u32);
        let name = task.name().to_string();
        trace!("Spawned {} '{}'", id, name);
        self.note(TraceEvent::Spawned {
            task: id,
            name: name.clone(),
        });
        self.tasks.push(TaskSlot {
            name,
            task: Some(Box::new(task)),
            state: TaskState::Runnable,
            failure: None,
        });
        self.ready.push_back(id);
        id
    }

    /// Returns lifecycle state of `task`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownTask` - Handle does not name a task
    pub fn task_state(&self, task: TaskId) -> Result<TaskState, SimulationError> {
        self.tasks
            .get(task.as_u32() as usize)
            .map(|slot| slot.state)
            .ok_or(SimulationError::UnknownTask { task })
    }

    /// Returns name and failure reason of every failed task, in spawn order.
    pub fn failed_tasks(&self) -> Vec<(TaskId, &str, &str)> {
        self.tasks
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.failure
                    .as_deref()
                    .map(|reason| (TaskId::new(index as u32), slot.name.as_str(), reason))
            })
            .collect()
    }

    /// Subscribes to `stream` from outside any task.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Stream` - Stream is unknown
    pub fn subscribe(&mut self, stream: StreamId) -> Result<SubscriptionId, SimulationError> {
        let subscription = self.registry.subscribe(stream)?;
        self.note(TraceEvent::Subscribed {
            task: None,
            stream,
            subscription,
        });
        Ok(subscription)
    }

    /// Emits on a hot stream from outside any task.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Stream` - Stream is unknown, cold or closed
    pub fn emit(&mut self, stream: StreamId, value: T) -> Result<EmitOutcome, SimulationError> {
        let rendered = render_value(&value);
        let outcome = self.registry.emit(stream, value)?;
        let event = if outcome.is_dropped() {
            TraceEvent::Dropped {
                task: None,
                stream,
                value: rendered,
            }
        } else {
            TraceEvent::Emitted {
                task: None,
                stream,
                value: rendered,
                delivered: outcome.delivered,
            }
        };
        self.note(event);
        self.dispatch_wakeups();
        Ok(outcome)
    }

    /// Cancels `subscription` from outside any task.
    ///
    /// A task suspended on it completes immediately.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Stream` - Subscription is unknown or already cancelled
    pub fn cancel(&mut self, subscription: SubscriptionId) -> Result<usize, SimulationError> {
        let discarded = self.registry.cancel(subscription)?;
        self.note(TraceEvent::Cancelled {
            task: None,
            subscription,
            discarded,
        });
        self.dispatch_wakeups();
        Ok(discarded)
    }

    /// Moves the clock forward by `duration`, waking expired deadline waits.
    ///
    /// # Errors
    ///
    /// - `SimulationError::TimeAdvanceTooLarge` - Duration exceeds 24 hours
    pub fn advance_by(&mut self, duration: Duration) -> Result<VirtualInstant, SimulationError> {
        let from = self.clock.now();
        let to = self.clock.advance(duration)?;
        self.note(TraceEvent::ClockAdvanced { from, to });
        self.wake_deadlines();
        Ok(to)
    }

    /// Runs until every task finished or the run stalls.
    ///
    /// # Errors
    ///
    /// - `SimulationError` - Internal bookkeeping failed; task failures are
    ///   reported through task state, not here
    pub fn run(&mut self) -> Result<RunOutcome, SimulationError> {
        self.dispatch_wakeups();
        loop {
            if !self.ready.is_empty() {
                if self.rounds >= self.config.round_quota {
                    return Ok(self.stall(StallReason::QuotaExhausted));
                }
                self.run_ready()?;
                continue;
            }

            if self.waiting.is_empty() {
                info!("Run quiescent after {} rounds", self.rounds);
                return Ok(RunOutcome::Quiescent {
                    rounds: self.rounds,
                });
            }

            let Some(deadline) = self.earliest_deadline() else {
                return Ok(self.stall(StallReason::PendingWaitConditions));
            };
            if !self.config.auto_advance {
                return Ok(self.stall(StallReason::AwaitingTimeAdvance));
            }

            let from = self.clock.now();
            if deadline > from {
                self.clock.advance_to(deadline)?;
                self.note(TraceEvent::ClockAdvanced { from, to: deadline });
            }
            self.wake_deadlines();
        }
    }

    /// Steps the task at the head of the ready queue, if any.
    ///
    /// Returns false when nothing was runnable.
    ///
    /// # Errors
    ///
    /// - `SimulationError::UnknownTask` - Ready queue named a task without a body
    pub fn run_ready(&mut self) -> Result<bool, SimulationError> {
        let Some(task) = self.ready.pop_front() else {
            return Ok(false);
        };
        self.step_task(task)?;
        self.dispatch_wakeups();
        Ok(true)
    }

    fn step_task(&mut self, id: TaskId) -> Result<(), SimulationError> {
        let slot = self
            .tasks
            .get_mut(id.as_u32() as usize)
            .ok_or(SimulationError::UnknownTask { task: id })?;
        let mut task = slot
            .task
            .take()
            .ok_or(SimulationError::UnknownTask { task: id })?;

        self.rounds += 1;
        self.trace.record(self.clock.now(), TraceEvent::Ran { task: id });
        trace!("Round {}: running {}", self.rounds, id);

        let step = {
            let mut cx = TaskContext::new(id, &self.clock, &mut self.registry, &mut self.trace);
            task.step(&mut cx)
        };

        match step {
            Step::Yield => {
                self.put_back(id, task, TaskState::Runnable);
                self.ready.push_back(id);
            }
            Step::Suspend(condition) => {
                self.put_back(id, task, TaskState::Suspended);
                self.note(TraceEvent::Suspended {
                    task: id,
                    condition,
                });
                self.register_wait(id, condition);
            }
            Step::Complete => {
                self.finish(id, TaskState::Completed);
                self.note(TraceEvent::Completed { task: id });
            }
            Step::Fail(reason) => {
                warn!("{} failed: {}", id, reason);
                self.finish(id, TaskState::Failed);
                if let Some(slot) = self.tasks.get_mut(id.as_u32() as usize) {
                    slot.failure = Some(reason.clone());
                }
                self.note(TraceEvent::Failed { task: id, reason });
            }
        }
        Ok(())
    }

    fn put_back(&mut self, id: TaskId, task: Box<dyn Task<T>>, state: TaskState) {
        if let Some(slot) = self.tasks.get_mut(id.as_u32() as usize) {
            slot.task = Some(task);
            slot.state = state;
        }
    }

    fn finish(&mut self, id: TaskId, state: TaskState) {
        if let Some(slot) = self.tasks.get_mut(id.as_u32() as usize) {
            slot.task = None;
            slot.state = state;
        }
    }

    /// Parks `task`, or requeues it right away when the condition already holds.
    fn register_wait(&mut self, task: TaskId, condition: WaitCondition) {
        if let Some(subscription) = condition.subscription() {
            let cancelled = self
                .registry
                .subscription(subscription)
                .is_some_and(|sub| sub.state() == SubscriptionState::Cancelled);
            if cancelled {
                self.wake(task, WakeReason::Cancelled);
                return;
            }
            if self.registry.is_ready(subscription) {
                self.wake(task, WakeReason::Data);
                return;
            }
        }
        if condition.deadline().is_some_and(|deadline| deadline <= self.clock.now()) {
            self.wake(task, WakeReason::Deadline);
            return;
        }

        let seq = self.next_wait_seq;
        self.next_wait_seq += 1;
        self.waiting.push(Waiter {
            task,
            condition,
            seq,
        });
    }

    fn wake(&mut self, task: TaskId, reason: WakeReason) {
        self.note(TraceEvent::Woken { task, reason });
        if reason == WakeReason::Cancelled {
            trace!("{} completed by cancellation", task);
            self.finish(task, TaskState::Completed);
            self.note(TraceEvent::Completed { task });
            return;
        }
        if let Some(slot) = self.tasks.get_mut(task.as_u32() as usize) {
            slot.state = TaskState::Runnable;
        }
        self.ready.push_back(task);
    }

    /// Moves waiters whose subscription changed to the ready queue, in wakeup order.
    fn dispatch_wakeups(&mut self) {
        for wakeup in self.registry.take_wakeups() {
            let Some(position) = self
                .waiting
                .iter()
                .position(|waiter| waiter.condition.subscription() == Some(wakeup.subscription))
            else {
                continue;
            };
            let waiter = self.waiting.remove(position);
            let reason = match wakeup.cause {
                WakeCause::Data => WakeReason::Data,
                WakeCause::Closed => WakeReason::Closed,
                WakeCause::Cancelled => WakeReason::Cancelled,
            };
            self.wake(waiter.task, reason);
        }
    }

    fn earliest_deadline(&self) -> Option<VirtualInstant> {
        self.waiting
            .iter()
            .filter_map(|waiter| waiter.condition.deadline())
            .min()
    }

    /// Wakes every waiter whose deadline has passed, earliest deadline first.
    fn wake_deadlines(&mut self) {
        let now = self.clock.now();
        let mut expired: Vec<Waiter> = Vec::new();
        self.waiting.retain(|waiter| {
            if waiter
                .condition
                .deadline()
                .is_some_and(|deadline| deadline <= now)
            {
                expired.push(*waiter);
                false
            } else {
                true
            }
        });
        expired.sort_by_key(|waiter| (waiter.condition.deadline(), waiter.seq));
        for waiter in expired {
            self.wake(waiter.task, WakeReason::Deadline);
        }
    }

    fn stall(&mut self, reason: StallReason) -> RunOutcome {
        let mut pending: Vec<PendingTask> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.state.is_finished())
            .map(|(index, slot)| {
                let task = TaskId::new(index as u32);
                PendingTask {
                    task,
                    name: slot.name.clone(),
                    condition: self
                        .waiting
                        .iter()
                        .find(|waiter| waiter.task == task)
                        .map(|waiter| waiter.condition),
                }
            })
            .collect();
        pending.sort_by_key(|pending| pending.task);

        warn!(
            "Run stalled after {} rounds: {} ({} tasks pending)",
            self.rounds,
            reason,
            pending.len()
        );
        for task in &pending {
            debug!("Pending: {}", task);
        }
        self.note(TraceEvent::Stalled {
            reason,
            pending: pending.len(),
        });

        RunOutcome::Stalled(StallReport {
            reason,
            pending,
            rounds: self.rounds,
            at: self.clock.now(),
        })
    }
}
