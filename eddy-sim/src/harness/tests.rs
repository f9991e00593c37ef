//! Tests for the stream test harness.

use std::time::Duration;

use eddy_core::config::EddyConfig;

use super::*;
use crate::deterministic::{StallReason, TraceEvent};

fn cold(values: &[&str]) -> StreamSpec<String> {
    StreamSpec::Cold(values.iter().map(|value| value.to_string()).collect())
}

fn expect(values: &[&str]) -> ExpectationScript<String> {
    ExpectationScript::new().values(values.iter().map(|value| value.to_string()))
}

fn emit(values: &[&str]) -> ProducerScript<String> {
    ProducerScript::new().emit_all(values.iter().map(|value| value.to_string()))
}

#[test]
fn test_cold_exact_sequence_passes() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            cold(&["Asset1", "Asset2"]),
            ProducerScript::new(),
            expect(&["Asset1", "Asset2"]).completion(),
        )
        .unwrap();

    assert_eq!(report.verdict, Verdict::Pass);
    assert_eq!(report.observed, vec![vec!["Asset1", "Asset2"]]);
}

#[test]
fn test_cold_extra_value_is_unexpected_continuation() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            cold(&["Asset1", "Asset2", "Asset3"]),
            ProducerScript::new(),
            expect(&["Asset1", "Asset2"]).completion(),
        )
        .unwrap();

    assert_eq!(
        report.verdict,
        Verdict::Fail(Failure::UnexpectedContinuation {
            consumer: 0,
            position: 2,
            actual: "Asset3".to_string(),
        })
    );
}

#[test]
fn test_cold_missing_value_is_premature_completion() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            cold(&["Asset1"]),
            ProducerScript::new(),
            expect(&["Asset1", "Asset2"]).completion(),
        )
        .unwrap();

    assert_eq!(
        report.verdict.failure_kind(),
        Some(FailureKind::PrematureCompletion)
    );
    assert_eq!(report.verdict.failure().and_then(Failure::position), Some(1));
}

#[test]
fn test_value_mismatch_reports_expected_and_actual() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            cold(&["Asset1", "Asset9"]),
            ProducerScript::new(),
            expect(&["Asset1", "Asset2"]),
        )
        .unwrap();

    assert_eq!(
        report.verdict,
        Verdict::Fail(Failure::ValueMismatch {
            consumer: 0,
            position: 1,
            expected: "Asset2".to_string(),
            actual: "Asset9".to_string(),
        })
    );
}

#[test]
fn test_hot_values_pass_without_completion() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1", "Asset2"]),
            expect(&["Asset1", "Asset2"]),
        )
        .unwrap();

    assert!(report.verdict.is_pass(), "{}", report.summary());
}

#[test]
fn test_hot_missing_value_stalls() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1"]),
            expect(&["Asset1", "Asset2"]),
        )
        .unwrap();

    let Verdict::Stalled(stall) = &report.verdict else {
        panic!("expected stall, got {}", report.verdict);
    };
    assert_eq!(stall.reason, StallReason::PendingWaitConditions);
    assert_eq!(stall.pending.len(), 1);
    assert_eq!(stall.pending[0].name, "consumer-0");
}

#[test]
fn test_hot_completion_never_arriving_stalls() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1"]),
            expect(&["Asset1"]).completion(),
        )
        .unwrap();

    assert!(report.verdict.is_stalled());
}

#[test]
fn test_hot_close_satisfies_completion() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1"]).close(),
            expect(&["Asset1"]).completion(),
        )
        .unwrap();

    assert!(report.verdict.is_pass(), "{}", report.summary());
}

#[test]
fn test_extra_hot_value_is_reported_unconsumed() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1", "Asset2"]),
            expect(&["Asset1"]),
        )
        .unwrap();

    assert_eq!(
        report.verdict,
        Verdict::Fail(Failure::UnconsumedValues {
            consumer: 0,
            values: vec!["Asset2".to_string()],
        })
    );
}

#[test]
fn test_unconsumed_values_allowed_when_disabled() {
    let mut config = EddyConfig::default();
    config.harness.fail_on_unconsumed = false;
    let harness = StreamTestHarness::new(config);

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1", "Asset2"]),
            expect(&["Asset1"]),
        )
        .unwrap();

    assert!(report.verdict.is_pass());
}

#[test]
fn test_ignore_remaining_cancels_subscription() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1", "Asset2", "Asset3"]),
            expect(&["Asset1"]).ignore_remaining(),
        )
        .unwrap();

    assert!(report.verdict.is_pass(), "{}", report.summary());
    assert!(report.trace.events().any(|event| matches!(
        event,
        TraceEvent::Cancelled {
            task: Some(_),
            discarded: 2,
            ..
        }
    )));
}

#[test]
fn test_timeout_passes_on_silence() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1"]),
            expect(&["Asset1"]).timeout(Duration::from_millis(500)),
        )
        .unwrap();

    assert!(report.verdict.is_pass(), "{}", report.summary());
    assert_eq!(report.finished_at.as_duration(), Duration::from_millis(500));
}

#[test]
fn test_timeout_fails_when_value_arrives_inside_window() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            ProducerScript::new()
                .advance(Duration::from_millis(100))
                .emit("late".to_string()),
            ExpectationScript::new().timeout(Duration::from_millis(500)),
        )
        .unwrap();

    assert_eq!(
        report.verdict,
        Verdict::Fail(Failure::UnexpectedEvent {
            consumer: 0,
            position: 0,
            window: Duration::from_millis(500),
            actual: Some("late".to_string()),
        })
    );
}

#[test]
fn test_value_at_window_end_passes_regardless_of_producer_shape() {
    let harness = StreamTestHarness::default();
    let script = expect(&["Asset1"])
        .timeout(Duration::from_millis(100))
        .value("Asset2".to_string());
    let single_advance = emit(&["Asset1"])
        .advance(Duration::from_millis(100))
        .emit("Asset2".to_string());
    let split_advance = emit(&["Asset1"])
        .advance(Duration::from_millis(50))
        .advance(Duration::from_millis(50))
        .emit("Asset2".to_string());

    for producer in [single_advance, split_advance] {
        let report = harness
            .run(StreamSpec::Hot, producer, script.clone())
            .unwrap();

        assert!(report.verdict.is_pass(), "{}", report.summary());
        assert_eq!(report.observed, vec![vec!["Asset1", "Asset2"]]);
        assert_eq!(report.finished_at.as_duration(), Duration::from_millis(100));
    }
}

#[test]
fn test_value_just_inside_window_still_breaks_silence() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1"])
                .advance(Duration::from_millis(99))
                .emit("Asset2".to_string()),
            expect(&["Asset1"])
                .timeout(Duration::from_millis(100))
                .value("Asset2".to_string()),
        )
        .unwrap();

    assert_eq!(
        report.verdict.failure_kind(),
        Some(FailureKind::UnexpectedEvent)
    );
}

#[test]
fn test_harness_advances_time_even_when_auto_advance_is_off() {
    let mut config = EddyConfig::default();
    config.scheduler.auto_advance = false;
    let harness = StreamTestHarness::new(config);

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1"]),
            expect(&["Asset1"]).timeout(Duration::from_millis(500)),
        )
        .unwrap();

    assert!(report.verdict.is_pass(), "{}", report.summary());
    assert_eq!(report.finished_at.as_duration(), Duration::from_millis(500));
}

#[test]
fn test_value_after_advance_is_received() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            ProducerScript::new()
                .advance(Duration::from_secs(2))
                .emit("Asset1".to_string()),
            expect(&["Asset1"]),
        )
        .unwrap();

    assert!(report.verdict.is_pass());
    assert_eq!(report.finished_at.as_duration(), Duration::from_secs(2));
}

#[test]
fn test_multicast_consumers_each_see_every_value() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run_many(
            StreamSpec::Hot,
            emit(&["a", "b"]),
            vec![expect(&["a", "b"]), expect(&["a", "b"])],
        )
        .unwrap();

    assert!(report.verdict.is_pass());
    assert_eq!(report.observed[0], report.observed[1]);
}

#[test]
fn test_failure_in_second_consumer_is_attributed() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run_many(
            StreamSpec::Hot,
            emit(&["a", "b"]),
            vec![expect(&["a", "b"]), expect(&["a", "c"])],
        )
        .unwrap();

    assert!(matches!(
        report.verdict,
        Verdict::Fail(Failure::ValueMismatch { consumer: 1, .. })
    ));
}

#[test]
fn test_emit_after_close_is_task_failure() {
    let harness = StreamTestHarness::default();

    let report = harness
        .run(
            StreamSpec::Hot,
            ProducerScript::new().close().emit("late".to_string()),
            ExpectationScript::new().completion(),
        )
        .unwrap();

    assert_eq!(
        report.verdict.failure_kind(),
        Some(FailureKind::TaskFailed)
    );
}

#[test]
fn test_tiny_quota_reports_quota_exhaustion() {
    let harness = StreamTestHarness::default().with_round_quota(1);

    let report = harness
        .run(
            StreamSpec::Hot,
            emit(&["Asset1"]),
            expect(&["Asset1"]),
        )
        .unwrap();

    assert!(matches!(
        report.verdict,
        Verdict::Stalled(ref stall) if stall.reason == StallReason::QuotaExhausted
    ));
}

#[test]
fn test_producer_script_on_cold_stream_is_misuse() {
    let harness = StreamTestHarness::default();

    let error = harness
        .run(cold(&["Asset1"]), emit(&["Asset2"]), expect(&["Asset1"]))
        .unwrap_err();

    assert!(matches!(
        error,
        HarnessError::ProducerOnColdStream { steps: 1 }
    ));
    assert!(error.is_precondition_violation());
}

#[test]
fn test_run_many_without_scripts_is_misuse() {
    let harness = StreamTestHarness::default();

    let error = harness
        .run_many(StreamSpec::Hot, emit(&["a"]), Vec::new())
        .unwrap_err();

    assert!(matches!(error, HarnessError::NoConsumers));
}

#[test]
fn test_zero_quota_is_rejected_as_configuration_error() {
    let harness = StreamTestHarness::default().with_round_quota(0);

    let error = harness
        .run(cold(&["a"]), ProducerScript::new(), expect(&["a"]))
        .unwrap_err();

    assert!(matches!(error, HarnessError::Config(_)));
}

#[test]
fn test_repeated_runs_are_identical() {
    let harness = StreamTestHarness::default();
    let run = || {
        harness
            .run_many(
                StreamSpec::Hot,
                emit(&["a"]).advance(Duration::from_millis(5)).emit_all(["b".to_string()]),
                vec![expect(&["a", "b"]), expect(&["a"]).ignore_remaining()],
            )
            .unwrap()
    };

    assert_eq!(run(), run());
}
