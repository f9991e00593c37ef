//! Cold stream replay semantics

use eddy_core::{NextEvent, StreamError, StreamRegistry, SubscriptionId};
use eddy_sim::{
    ExpectationScript, FailureKind, ProducerScript, StreamSpec, StreamTestHarness, Verdict,
};
use proptest::prelude::*;

fn drain(registry: &mut StreamRegistry<u32>, subscription: SubscriptionId) -> Vec<u32> {
    let mut values = Vec::new();
    while let NextEvent::Value(value) = registry.next(subscription).unwrap() {
        values.push(value);
    }
    values
}

proptest! {
    #[test]
    fn test_every_subscriber_replays_the_full_sequence(values in prop::collection::vec(any::<u32>(), 0..32)) {
        let mut registry = StreamRegistry::new();
        let stream = registry.create_cold(values.clone());
        let first = registry.subscribe(stream).unwrap();
        let second = registry.subscribe(stream).unwrap();

        let first_values = drain(&mut registry, first);
        let second_values = drain(&mut registry, second);

        prop_assert_eq!(&first_values, &values);
        prop_assert_eq!(&second_values, &values);
        prop_assert_eq!(registry.next(first).unwrap(), NextEvent::Completed);
    }

    #[test]
    fn test_late_subscriber_is_unaffected_by_earlier_reads(
        values in prop::collection::vec(any::<u32>(), 1..16),
        read in 0usize..16,
    ) {
        let mut registry = StreamRegistry::new();
        let stream = registry.create_cold(values.clone());
        let early = registry.subscribe(stream).unwrap();
        for _ in 0..read.min(values.len()) {
            registry.next(early).unwrap();
        }

        let late = registry.subscribe(stream).unwrap();

        prop_assert_eq!(drain(&mut registry, late), values);
    }
}

#[test]
fn test_cancel_discards_remaining_cold_values() {
    let mut registry = StreamRegistry::new();
    let stream = registry.create_cold([1, 2, 3]);
    let subscription = registry.subscribe(stream).unwrap();
    registry.next(subscription).unwrap();

    let discarded = registry.cancel(subscription).unwrap();

    assert_eq!(discarded, 2);
    assert_eq!(registry.next(subscription).unwrap(), NextEvent::Cancelled);
    assert!(matches!(
        registry.cancel(subscription),
        Err(StreamError::AlreadyCancelled { .. })
    ));
}

#[test]
fn test_cold_stream_rejects_pushes() {
    let mut registry: StreamRegistry<u32> = StreamRegistry::new();
    let stream = registry.create_cold([1]);

    assert!(matches!(
        registry.emit(stream, 2),
        Err(StreamError::HotOnly { .. })
    ));
}

#[test]
fn test_cold_exact_match_passes() {
    let report = StreamTestHarness::default()
        .run(
            StreamSpec::Cold(vec!["Asset1", "Asset2"]),
            ProducerScript::new(),
            ExpectationScript::new()
                .value("Asset1")
                .value("Asset2")
                .completion(),
        )
        .unwrap();

    assert_eq!(report.verdict, Verdict::Pass);
}

#[test]
fn test_cold_extra_emission_fails_with_unexpected_continuation() {
    let report = StreamTestHarness::default()
        .run(
            StreamSpec::Cold(vec!["Asset1", "Asset2", "Asset3"]),
            ProducerScript::new(),
            ExpectationScript::new()
                .value("Asset1")
                .value("Asset2")
                .completion(),
        )
        .unwrap();

    assert_eq!(
        report.verdict.failure_kind(),
        Some(FailureKind::UnexpectedContinuation)
    );
}

#[test]
fn test_each_cold_consumer_gets_its_own_replay() {
    let script = ExpectationScript::new().values([1, 2, 3]).completion();

    let report = StreamTestHarness::default()
        .run_many(
            StreamSpec::Cold(vec![1, 2, 3]),
            ProducerScript::new(),
            vec![script.clone(), script.clone(), script],
        )
        .unwrap();

    assert!(report.verdict.is_pass());
    assert!(report.observed.iter().all(|values| values == &[1, 2, 3]));
}
