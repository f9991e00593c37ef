//! Consumer and producer tasks driven by scripts.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use eddy_core::{NextEvent, PushService, StreamError, StreamId, SubscriptionId};
use tracing::trace;

use super::expectation::{Expectation, ProducerStep};
use super::verdict::Failure;
use crate::deterministic::{Step, Task, TaskContext, TraceEvent, VirtualInstant, WaitCondition};

/// What a scripted consumer saw, shared with the harness.
#[derive(Debug)]
pub(crate) struct ConsumerRecord<T> {
    pub subscription: Option<SubscriptionId>,
    pub observed: Vec<T>,
    pub failure: Option<Failure<T>>,
    /// Every assertion matched
    pub script_done: bool,
}

impl<T> Default for ConsumerRecord<T> {
    fn default() -> Self {
        Self {
            subscription: None,
            observed: Vec::new(),
            failure: None,
            script_done: false,
        }
    }
}

/// Matches incoming events against an expectation script.
pub(crate) struct ScriptedConsumer<T> {
    name: String,
    index: usize,
    stream: StreamId,
    script: Vec<Expectation<T>>,
    position: usize,
    deadline: Option<VirtualInstant>,
    record: Rc<RefCell<ConsumerRecord<T>>>,
}

impl<T> ScriptedConsumer<T> {
    pub fn new(
        index: usize,
        stream: StreamId,
        script: Vec<Expectation<T>>,
        record: Rc<RefCell<ConsumerRecord<T>>>,
    ) -> Self {
        Self {
            name: format!("consumer-{index}"),
            index,
            stream,
            script,
            position: 0,
            deadline: None,
            record,
        }
    }
}

impl<T: Clone + PartialEq + fmt::Debug> ScriptedConsumer<T> {
    fn met(&mut self, cx: &mut TaskContext<'_, T>, expectation: String) {
        cx.record(TraceEvent::ExpectationMet {
            task: cx.task_id(),
            position: self.position,
            expectation,
        });
        self.position += 1;
    }

    fn fail(&mut self, cx: &mut TaskContext<'_, T>, failure: Failure<T>) -> Step {
        trace!("{} failed at #{}: {}", self.name, self.position, failure);
        cx.record(TraceEvent::ExpectationFailed {
            task: cx.task_id(),
            position: self.position,
            detail: failure.to_string(),
        });
        self.record.borrow_mut().failure = Some(failure);
        Step::Complete
    }

    fn next(
        &mut self,
        cx: &mut TaskContext<'_, T>,
        sub: SubscriptionId,
    ) -> Result<NextEvent<T>, StreamError> {
        let event = cx.next(sub)?;
        if let NextEvent::Value(value) = &event {
            self.record.borrow_mut().observed.push(value.clone());
        }
        Ok(event)
    }

    /// Matches queued events against the script until it must wait or is done.
    fn advance(
        &mut self,
        cx: &mut TaskContext<'_, T>,
        sub: SubscriptionId,
    ) -> Result<Step, StreamError> {
        loop {
            let Some(expectation) = self.script.get(self.position).cloned() else {
                self.record.borrow_mut().script_done = true;
                return Ok(Step::Complete);
            };
            let label = expectation.to_string();

            match expectation {
                Expectation::Value(expected) => match self.next(cx, sub)? {
                    NextEvent::Value(actual) if actual == expected => self.met(cx, label),
                    NextEvent::Value(actual) => {
                        let failure = Failure::ValueMismatch {
                            consumer: self.index,
                            position: self.position,
                            expected,
                            actual,
                        };
                        return Ok(self.fail(cx, failure));
                    }
                    NextEvent::Completed | NextEvent::Cancelled => {
                        let failure = Failure::PrematureCompletion {
                            consumer: self.index,
                            position: self.position,
                            expected: Expectation::Value(expected),
                        };
                        return Ok(self.fail(cx, failure));
                    }
                    NextEvent::Pending => return Ok(Step::Suspend(WaitCondition::Data(sub))),
                },
                Expectation::Completion => match self.next(cx, sub)? {
                    NextEvent::Completed | NextEvent::Cancelled => self.met(cx, label),
                    NextEvent::Value(actual) => {
                        let failure = Failure::UnexpectedContinuation {
                            consumer: self.index,
                            position: self.position,
                            actual,
                        };
                        return Ok(self.fail(cx, failure));
                    }
                    NextEvent::Pending => return Ok(Step::Suspend(WaitCondition::Data(sub))),
                },
                Expectation::Timeout(window) => {
                    // Anything queued at or after the deadline belongs to the
                    // next expectation, whichever task the clock woke first.
                    let deadline = match self.deadline {
                        Some(deadline) if cx.now() >= deadline => {
                            self.deadline = None;
                            self.met(cx, label);
                            continue;
                        }
                        Some(deadline) => deadline,
                        None => *self.deadline.insert(cx.now().saturating_add(window)),
                    };
                    let actual = match self.next(cx, sub)? {
                        NextEvent::Pending if cx.now() >= deadline => {
                            self.deadline = None;
                            self.met(cx, label);
                            continue;
                        }
                        NextEvent::Pending => {
                            return Ok(Step::Suspend(WaitCondition::DataOrDeadline {
                                subscription: sub,
                                deadline,
                            }));
                        }
                        NextEvent::Value(value) => Some(value),
                        NextEvent::Completed | NextEvent::Cancelled => None,
                    };
                    let failure = Failure::UnexpectedEvent {
                        consumer: self.index,
                        position: self.position,
                        window,
                        actual,
                    };
                    return Ok(self.fail(cx, failure));
                }
                Expectation::IgnoreRemaining => {
                    cx.cancel(sub)?;
                    self.met(cx, label);
                    self.record.borrow_mut().script_done = true;
                    return Ok(Step::Complete);
                }
            }
        }
    }
}

impl<T: Clone + PartialEq + fmt::Debug> Task<T> for ScriptedConsumer<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, cx: &mut TaskContext<'_, T>) -> Step {
        let existing = self.record.borrow().subscription;
        let sub = match existing {
            Some(sub) => sub,
            None => match cx.subscribe(self.stream) {
                Ok(sub) => {
                    self.record.borrow_mut().subscription = Some(sub);
                    sub
                }
                Err(e) => return Step::Fail(e.to_string()),
            },
        };

        match self.advance(cx, sub) {
            Ok(step) => step,
            Err(e) => Step::Fail(e.to_string()),
        }
    }
}

/// Replays a producer script against a hot stream through its push service.
pub(crate) struct ScriptedProducer<T> {
    stream: StreamId,
    script: Vec<ProducerStep<T>>,
    position: usize,
}

impl<T> ScriptedProducer<T> {
    pub fn new(stream: StreamId, script: Vec<ProducerStep<T>>) -> Self {
        Self {
            stream,
            script,
            position: 0,
        }
    }
}

impl<T: Clone + fmt::Debug> Task<T> for ScriptedProducer<T> {
    fn name(&self) -> &str {
        "producer"
    }

    fn step(&mut self, cx: &mut TaskContext<'_, T>) -> Step {
        while let Some(instruction) = self.script.get(self.position) {
            self.position += 1;
            let result = match instruction {
                ProducerStep::Emit(value) => cx
                    .push_service(self.stream)
                    .push(value.clone())
                    .map(|_| ()),
                ProducerStep::Advance(delay) => {
                    return Step::Suspend(WaitCondition::Until(cx.now().saturating_add(*delay)));
                }
                ProducerStep::Close => cx.close(self.stream).map(|_| ()),
            };
            if let Err(e) = result {
                return Step::Fail(e.to_string());
            }
        }
        Step::Complete
    }
}
