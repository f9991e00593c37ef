//! Tests for the cooperative scheduler.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use eddy_core::config::SchedulerConfig;
use eddy_core::{NextEvent, PushService, StreamId};

use crate::deterministic::{
    CooperativeScheduler, FnTask, RunOutcome, StallReason, Step, Task, TaskContext, TaskId,
    TaskState, TraceEvent, VirtualInstant, WaitCondition, WakeReason,
};

type Seen = Rc<RefCell<Vec<String>>>;

/// Consumer that records values until `limit` are seen or the stream ends.
fn consumer(stream: StreamId, limit: usize, seen: Seen) -> impl Task<String> {
    let mut subscription = None;
    FnTask::new("consumer", move |cx: &mut TaskContext<'_, String>| {
        let sub = match subscription {
            Some(sub) => sub,
            None => match cx.subscribe(stream) {
                Ok(sub) => {
                    subscription = Some(sub);
                    sub
                }
                Err(e) => return Step::Fail(e.to_string()),
            },
        };
        while seen.borrow().len() < limit {
            match cx.next(sub) {
                Ok(NextEvent::Value(value)) => seen.borrow_mut().push(value),
                Ok(NextEvent::Pending) => return Step::Suspend(WaitCondition::Data(sub)),
                Ok(NextEvent::Completed | NextEvent::Cancelled) => return Step::Complete,
                Err(e) => return Step::Fail(e.to_string()),
            }
        }
        Step::Complete
    })
}

fn producer(stream: StreamId, values: &[&str]) -> impl Task<String> {
    let values: Vec<String> = values.iter().map(|value| value.to_string()).collect();
    FnTask::new("producer", move |cx: &mut TaskContext<'_, String>| {
        for value in &values {
            if let Err(e) = cx.push_service(stream).push(value.clone()) {
                return Step::Fail(e.to_string());
            }
        }
        Step::Complete
    })
}

fn woken_tasks(scheduler: &CooperativeScheduler<String>) -> Vec<TaskId> {
    scheduler
        .trace()
        .events()
        .filter_map(|event| match event {
            TraceEvent::Woken { task, .. } => Some(*task),
            _ => None,
        })
        .collect()
}

#[test]
fn test_hot_broadcast_wakes_in_registration_order() {
    let mut scheduler = CooperativeScheduler::new(SchedulerConfig::default());
    let stream = scheduler.registry_mut().create_hot();
    let first: Seen = Rc::default();
    let second: Seen = Rc::default();

    let a = scheduler.spawn(consumer(stream, 2, first.clone()));
    let b = scheduler.spawn(consumer(stream, 2, second.clone()));
    scheduler.spawn(producer(stream, &["Asset1", "Asset2"]));

    let outcome = scheduler.run().unwrap();

    assert!(outcome.is_quiescent());
    assert_eq!(*first.borrow(), vec!["Asset1", "Asset2"]);
    assert_eq!(*second.borrow(), vec!["Asset1", "Asset2"]);
    assert_eq!(woken_tasks(&scheduler), vec![a, b]);
}

#[test]
fn test_consumer_without_producer_stalls() {
    let mut scheduler = CooperativeScheduler::new(SchedulerConfig::default());
    let stream = scheduler.registry_mut().create_hot();
    let seen: Seen = Rc::default();
    let task = scheduler.spawn(consumer(stream, 1, seen));

    let RunOutcome::Stalled(report) = scheduler.run().unwrap() else {
        panic!("expected stall");
    };

    assert_eq!(report.reason, StallReason::PendingWaitConditions);
    assert_eq!(report.pending.len(), 1);
    assert_eq!(report.pending[0].task, task);
    assert!(matches!(
        report.pending[0].condition,
        Some(WaitCondition::Data(_))
    ));
    assert_eq!(scheduler.task_state(task).unwrap(), TaskState::Suspended);
}

#[test]
fn test_await_before_push_in_same_task_stalls() {
    let mut scheduler = CooperativeScheduler::new(SchedulerConfig::default());
    let stream = scheduler.registry_mut().create_hot();
    let mut subscription = None;

    // Awaits its own subscription first, so the push below is never reached.
    scheduler.spawn(FnTask::new(
        "await-then-push",
        move |cx: &mut TaskContext<'_, String>| {
            let sub = match subscription {
                Some(sub) => sub,
                None => match cx.subscribe(stream) {
                    Ok(sub) => {
                        subscription = Some(sub);
                        sub
                    }
                    Err(e) => return Step::Fail(e.to_string()),
                },
            };
            match cx.next(sub) {
                Ok(NextEvent::Pending) => Step::Suspend(WaitCondition::Data(sub)),
                Ok(_) => match cx.emit(stream, "Asset1".to_string()) {
                    Ok(_) => Step::Complete,
                    Err(e) => Step::Fail(e.to_string()),
                },
                Err(e) => Step::Fail(e.to_string()),
            }
        },
    ));

    let outcome = scheduler.run().unwrap();

    assert!(matches!(
        outcome,
        RunOutcome::Stalled(report) if report.reason == StallReason::PendingWaitConditions
    ));
}

#[test]
fn test_busy_task_exhausts_round_quota() {
    let config = SchedulerConfig {
        round_quota: 25,
        ..SchedulerConfig::default()
    };
    let mut scheduler: CooperativeScheduler<String> = CooperativeScheduler::new(config);
    scheduler.spawn(FnTask::new("spinner", |_: &mut TaskContext<'_, String>| {
        Step::Yield
    }));

    let RunOutcome::Stalled(report) = scheduler.run().unwrap() else {
        panic!("expected stall");
    };

    assert_eq!(report.reason, StallReason::QuotaExhausted);
    assert_eq!(report.rounds, 25);
    assert_eq!(report.pending[0].condition, None);
}

#[test]
fn test_deadline_wait_auto_advances_clock() {
    let mut scheduler: CooperativeScheduler<String> =
        CooperativeScheduler::new(SchedulerConfig::default());
    let mut slept = false;
    let task = scheduler.spawn(FnTask::new(
        "sleeper",
        move |cx: &mut TaskContext<'_, String>| {
            if slept {
                return Step::Complete;
            }
            slept = true;
            Step::Suspend(WaitCondition::Until(
                cx.now().saturating_add(Duration::from_millis(300)),
            ))
        },
    ));

    let outcome = scheduler.run().unwrap();

    assert!(outcome.is_quiescent());
    assert_eq!(scheduler.now(), VirtualInstant::from_millis(300));
    assert_eq!(scheduler.task_state(task).unwrap(), TaskState::Completed);
    assert!(scheduler.trace().events().any(|event| matches!(
        event,
        TraceEvent::Woken {
            reason: WakeReason::Deadline,
            ..
        }
    )));
}

#[test]
fn test_manual_time_control_without_auto_advance() {
    let config = SchedulerConfig {
        auto_advance: false,
        ..SchedulerConfig::default()
    };
    let mut scheduler: CooperativeScheduler<String> = CooperativeScheduler::new(config);
    let mut slept = false;
    scheduler.spawn(FnTask::new(
        "sleeper",
        move |_: &mut TaskContext<'_, String>| {
            if slept {
                return Step::Complete;
            }
            slept = true;
            Step::Suspend(WaitCondition::Until(VirtualInstant::from_millis(50)))
        },
    ));

    let first = scheduler.run().unwrap();
    assert!(matches!(
        first,
        RunOutcome::Stalled(report) if report.reason == StallReason::AwaitingTimeAdvance
    ));

    scheduler.advance_by(Duration::from_millis(50)).unwrap();
    assert!(scheduler.run().unwrap().is_quiescent());
}

#[test]
fn test_external_cancel_completes_suspended_consumer() {
    let mut scheduler = CooperativeScheduler::new(SchedulerConfig::default());
    let stream = scheduler.registry_mut().create_hot();
    let seen: Seen = Rc::default();
    let task = scheduler.spawn(consumer(stream, 3, seen));

    assert!(!scheduler.run().unwrap().is_quiescent());

    let subscription = scheduler
        .trace()
        .events()
        .find_map(|event| match event {
            TraceEvent::Subscribed { subscription, .. } => Some(*subscription),
            _ => None,
        })
        .unwrap();
    scheduler.cancel(subscription).unwrap();

    assert_eq!(scheduler.task_state(task).unwrap(), TaskState::Completed);
    assert!(scheduler.run().unwrap().is_quiescent());
}

#[test]
fn test_cold_stream_consumers_replay_independently() {
    let mut scheduler = CooperativeScheduler::new(SchedulerConfig::default());
    let stream = scheduler
        .registry_mut()
        .create_cold(["Asset1".to_string(), "Asset2".to_string()]);
    let first: Seen = Rc::default();
    let second: Seen = Rc::default();
    scheduler.spawn(consumer(stream, usize::MAX, first.clone()));
    scheduler.spawn(consumer(stream, usize::MAX, second.clone()));

    assert!(scheduler.run().unwrap().is_quiescent());
    assert_eq!(*first.borrow(), *second.borrow());
    assert_eq!(*first.borrow(), vec!["Asset1", "Asset2"]);
}

#[test]
fn test_identical_runs_produce_identical_traces() {
    let run = || {
        let mut scheduler = CooperativeScheduler::new(SchedulerConfig::default());
        let stream = scheduler.registry_mut().create_hot();
        scheduler.spawn(consumer(stream, 3, Rc::default()));
        scheduler.spawn(consumer(stream, 1, Rc::default()));
        scheduler.spawn(producer(stream, &["a", "b", "c"]));
        let outcome = scheduler.run().unwrap();
        (outcome, scheduler.into_trace())
    };

    let (first_outcome, first_trace) = run();
    let (second_outcome, second_trace) = run();

    assert_eq!(first_outcome, second_outcome);
    assert_eq!(first_trace, second_trace);
}

#[test]
fn test_emit_without_subscribers_is_traced_as_dropped() {
    let mut scheduler: CooperativeScheduler<String> =
        CooperativeScheduler::new(SchedulerConfig::default());
    let stream = scheduler.registry_mut().create_hot();

    let outcome = scheduler.emit(stream, "lost".to_string()).unwrap();

    assert!(outcome.is_dropped());
    assert!(matches!(
        scheduler.trace().events().last(),
        Some(TraceEvent::Dropped { task: None, .. })
    ));
}
