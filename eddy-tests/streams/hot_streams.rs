//! Hot stream broadcast semantics

use eddy_core::{NextEvent, OwnerId, PushService, StreamError, StreamRegistry};
use eddy_sim::{
    ExpectationScript, ProducerScript, StallReason, StreamSpec, StreamTestHarness, Verdict,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_values_before_subscription_are_never_observed(
        values in prop::collection::vec(any::<u16>(), 0..24),
        split in 0usize..24,
    ) {
        let split = split.min(values.len());
        let mut registry = StreamRegistry::new();
        let stream = registry.create_hot();

        for value in &values[..split] {
            registry.emit(stream, *value).unwrap();
        }
        let subscription = registry.subscribe(stream).unwrap();
        for value in &values[split..] {
            registry.emit(stream, *value).unwrap();
        }

        let mut observed = Vec::new();
        while let NextEvent::Value(value) = registry.next(subscription).unwrap() {
            observed.push(value);
        }
        prop_assert_eq!(observed, values[split..].to_vec());
    }

    #[test]
    fn test_concurrent_subscribers_observe_identical_order(
        values in prop::collection::vec(any::<u16>(), 0..24),
    ) {
        let mut registry = StreamRegistry::new();
        let stream = registry.create_hot();
        let a = registry.subscribe(stream).unwrap();
        let b = registry.subscribe(stream).unwrap();

        let mut push = registry.push_service(stream);
        for value in &values {
            push.push(*value).unwrap();
        }

        prop_assert_eq!(registry.unconsumed(a), values.clone());
        prop_assert_eq!(registry.unconsumed(b), values);
    }
}

#[test]
fn test_emit_without_subscribers_is_dropped_not_an_error() {
    let mut registry = StreamRegistry::new();
    let stream = registry.create_hot();

    let outcome = registry.emit(stream, "lost").unwrap();
    let subscription = registry.subscribe(stream).unwrap();

    assert!(outcome.is_dropped());
    assert_eq!(registry.next(subscription).unwrap(), NextEvent::Pending);
}

#[test]
fn test_cancelled_subscriber_stops_receiving() {
    let mut registry = StreamRegistry::new();
    let stream = registry.create_hot();
    let kept = registry.subscribe(stream).unwrap();
    let cancelled = registry.subscribe(stream).unwrap();

    registry.cancel(cancelled).unwrap();
    let outcome = registry.emit(stream, 7).unwrap();

    assert_eq!(outcome.delivered, 1);
    assert_eq!(registry.unconsumed(kept), vec![7]);
    assert_eq!(registry.next(cancelled).unwrap(), NextEvent::Cancelled);
}

#[test]
fn test_double_subscribe_by_same_owner_is_precondition_violation() {
    let mut registry: StreamRegistry<u8> = StreamRegistry::new();
    let stream = registry.create_hot();
    let owner = OwnerId(1);
    let first = registry.subscribe_owned(stream, owner).unwrap();

    let second = registry.subscribe_owned(stream, owner);
    assert!(matches!(second, Err(StreamError::AlreadySubscribed { .. })));

    registry.cancel(first).unwrap();
    assert!(registry.subscribe_owned(stream, owner).is_ok());
}

#[test]
fn test_hot_two_values_pass_without_completion() {
    let report = StreamTestHarness::default()
        .run(
            StreamSpec::Hot,
            ProducerScript::new().emit("Asset1").emit("Asset2"),
            ExpectationScript::new().value("Asset1").value("Asset2"),
        )
        .unwrap();

    assert_eq!(report.verdict, Verdict::Pass);
}

#[test]
fn test_hot_missing_value_is_reported_as_stall() {
    let report = StreamTestHarness::default()
        .run(
            StreamSpec::Hot,
            ProducerScript::new().emit("Asset1"),
            ExpectationScript::new().value("Asset1").value("Asset2"),
        )
        .unwrap();

    match &report.verdict {
        Verdict::Stalled(stall) => {
            assert_eq!(stall.reason, StallReason::PendingWaitConditions);
            assert_eq!(stall.pending.len(), 1);
        }
        other => panic!("expected stall, got {other}"),
    }
    assert_eq!(report.observed, vec![vec!["Asset1"]]);
}

#[test]
fn test_stall_trace_explains_the_hang() {
    let report = StreamTestHarness::default()
        .run(
            StreamSpec::Hot,
            ProducerScript::new().emit("Asset1"),
            ExpectationScript::new().value("Asset1").value("Asset2"),
        )
        .unwrap();

    let rendered = report.trace.to_string();
    assert!(rendered.contains("emitted \"Asset1\""));
    assert!(rendered.contains("suspends waiting for data"));
    assert!(rendered.contains("stalled: pending wait conditions"));
}
