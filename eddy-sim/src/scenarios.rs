//! Pre-built stream scenarios
//!
//! Each scenario pairs a stream with a producer script, one or more
//! expectation scripts and the verdict the harness must reach. They cover the
//! classic ways stream tests go wrong: reading too few or too many values,
//! waiting for a completion a hot stream never sends, and waiting for a value
//! nobody pushes.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::deterministic::DeterministicRng;
use crate::harness::{
    ExpectationScript, FailureKind, HarnessError, HarnessReport, ProducerScript, StreamSpec,
    StreamTestHarness, Verdict,
};

/// Verdict a scenario is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExpectedVerdict {
    Pass,
    Fail(FailureKind),
    Stalled,
}

impl ExpectedVerdict {
    /// Returns true when `verdict` has the expected shape.
    pub fn matches<T>(&self, verdict: &Verdict<T>) -> bool {
        match (self, verdict) {
            (ExpectedVerdict::Pass, Verdict::Pass) => true,
            (ExpectedVerdict::Stalled, Verdict::Stalled(_)) => true,
            (ExpectedVerdict::Fail(kind), Verdict::Fail(failure)) => failure.kind() == *kind,
            _ => false,
        }
    }
}

impl fmt::Display for ExpectedVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedVerdict::Pass => write!(f, "pass"),
            ExpectedVerdict::Fail(kind) => write!(f, "fail ({kind})"),
            ExpectedVerdict::Stalled => write!(f, "stalled"),
        }
    }
}

/// Named, reproducible harness run.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    pub stream: StreamSpec<String>,
    pub producer: ProducerScript<String>,
    pub consumers: Vec<ExpectationScript<String>>,
    pub expected: ExpectedVerdict,
}

/// Scenario report plus whether it matched the expected verdict.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: String,
    pub expected: ExpectedVerdict,
    pub matched: bool,
    pub report: HarnessReport<String>,
}

impl Scenario {
    fn new(
        name: &str,
        description: &str,
        stream: StreamSpec<String>,
        producer: ProducerScript<String>,
        consumer: ExpectationScript<String>,
        expected: ExpectedVerdict,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            stream,
            producer,
            consumers: vec![consumer],
            expected,
        }
    }

    /// Runs the scenario through `harness`.
    ///
    /// # Errors
    ///
    /// - `HarnessError` - Scenario is malformed or the configuration is invalid
    pub fn run(&self, harness: &StreamTestHarness) -> Result<HarnessReport<String>, HarnessError> {
        harness.run_many(
            self.stream.clone(),
            self.producer.clone(),
            self.consumers.clone(),
        )
    }

    /// Runs the scenario and compares the verdict with the expected one.
    ///
    /// # Errors
    ///
    /// - `HarnessError` - Scenario is malformed or the configuration is invalid
    pub fn check(&self, harness: &StreamTestHarness) -> Result<ScenarioOutcome, HarnessError> {
        let report = self.run(harness)?;
        Ok(ScenarioOutcome {
            scenario: self.name.clone(),
            expected: self.expected,
            matched: self.expected.matches(&report.verdict),
            report,
        })
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn expect(values: &[&str]) -> ExpectationScript<String> {
    ExpectationScript::new().values(strings(values))
}

fn push(values: &[&str]) -> ProducerScript<String> {
    ProducerScript::new().emit_all(strings(values))
}

/// Returns every built-in scenario.
pub fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new(
            "cold-exact",
            "Cold stream read value by value, then completion",
            StreamSpec::Cold(strings(&["Asset1", "Asset2"])),
            ProducerScript::new(),
            expect(&["Asset1", "Asset2"]).completion(),
            ExpectedVerdict::Pass,
        ),
        Scenario::new(
            "cold-extra-emission",
            "Cold stream emits one more value than the test expects",
            StreamSpec::Cold(strings(&["Asset1", "Asset2", "Asset3"])),
            ProducerScript::new(),
            expect(&["Asset1", "Asset2"]).completion(),
            ExpectedVerdict::Fail(FailureKind::UnexpectedContinuation),
        ),
        Scenario::new(
            "cold-missing-emission",
            "Cold stream completes before the test has seen every value",
            StreamSpec::Cold(strings(&["Asset1"])),
            ProducerScript::new(),
            expect(&["Asset1", "Asset2"]).completion(),
            ExpectedVerdict::Fail(FailureKind::PrematureCompletion),
        ),
        Scenario::new(
            "cold-first-only",
            "Reading only the first value leaves the rest unread",
            StreamSpec::Cold(strings(&["Asset1", "Asset2"])),
            ProducerScript::new(),
            expect(&["Asset1"]),
            ExpectedVerdict::Fail(FailureKind::UnconsumedValues),
        ),
        Scenario::new(
            "hot-two-values",
            "Hot stream pushed twice; test reads both and never needs completion",
            StreamSpec::Hot,
            push(&["Asset1", "Asset2"]),
            expect(&["Asset1", "Asset2"]),
            ExpectedVerdict::Pass,
        ),
        Scenario::new(
            "hot-extra-value",
            "Four assets pushed but three expected",
            StreamSpec::Hot,
            push(&["Asset1", "Asset2", "Asset3", "Asset4"]),
            expect(&["Asset1", "Asset2", "Asset3"]),
            ExpectedVerdict::Fail(FailureKind::UnconsumedValues),
        ),
        Scenario::new(
            "hot-missing-value",
            "Two values expected but the producer pushes one and stops",
            StreamSpec::Hot,
            push(&["Asset1"]),
            expect(&["Asset1", "Asset2"]),
            ExpectedVerdict::Stalled,
        ),
        Scenario::new(
            "hot-completion-never-arrives",
            "Waiting for a hot stream to end when nobody closes it",
            StreamSpec::Hot,
            push(&["Asset1"]),
            expect(&["Asset1"]).completion(),
            ExpectedVerdict::Stalled,
        ),
        Scenario::new(
            "hot-close-completes",
            "Closing the hot stream delivers completion to the consumer",
            StreamSpec::Hot,
            push(&["Asset1", "Asset2"]).close(),
            expect(&["Asset1", "Asset2"]).completion(),
            ExpectedVerdict::Pass,
        ),
        Scenario::new(
            "hot-silence-timeout",
            "Nothing further arrives within the silence window",
            StreamSpec::Hot,
            push(&["Asset1"]),
            expect(&["Asset1"]).timeout(Duration::from_millis(500)),
            ExpectedVerdict::Pass,
        ),
        Scenario::new(
            "hot-late-value-breaks-silence",
            "A value arrives inside the expected silence window",
            StreamSpec::Hot,
            push(&["Asset1"])
                .advance(Duration::from_millis(200))
                .emit("Asset2".to_string()),
            expect(&["Asset1"]).timeout(Duration::from_millis(500)),
            ExpectedVerdict::Fail(FailureKind::UnexpectedEvent),
        ),
        Scenario::new(
            "hot-cancel-and-ignore",
            "Reads two of three values and cancels instead of failing on the rest",
            StreamSpec::Hot,
            push(&["Asset1", "Asset2", "Asset3"]),
            expect(&["Asset1", "Asset2"]).ignore_remaining(),
            ExpectedVerdict::Pass,
        ),
        Scenario {
            name: "hot-multicast".to_string(),
            description: "Two listeners both see every value in order".to_string(),
            stream: StreamSpec::Hot,
            producer: push(&["Asset1"])
                .advance(Duration::from_millis(100))
                .emit("Asset2".to_string())
                .close(),
            consumers: vec![
                expect(&["Asset1", "Asset2"]).completion(),
                expect(&["Asset1", "Asset2"]).completion(),
            ],
            expected: ExpectedVerdict::Pass,
        },
    ]
}

/// Finds a built-in scenario by name.
pub fn find_scenario(name: &str) -> Option<Scenario> {
    builtin_scenarios()
        .into_iter()
        .find(|scenario| scenario.name == name)
}

/// Generates a hot-stream scenario from `seed`.
///
/// The same seed always yields the same scenario. The expectation reads a
/// random prefix, all, or more than the producer pushes, so every verdict
/// shape is reachable.
pub fn random_hot_scenario(seed: u64) -> Scenario {
    let mut rng = DeterministicRng::from_seed(seed);
    let consumer_count = rng.random_range(1, 4) as usize;
    let value_count = rng.random_range(0, 6);

    let mut producer = ProducerScript::new();
    let mut values = Vec::new();
    for index in 0..value_count {
        if rng.random_bool(0.3) {
            producer = producer.advance(Duration::from_millis(rng.random_range(1, 250)));
        }
        let value = format!("v{index}");
        values.push(value.clone());
        producer = producer.emit(value);
    }
    let closes = rng.random_bool(0.5);
    if closes {
        producer = producer.close();
    }

    let consumers = (0..consumer_count)
        .map(|_| {
            let read = rng.random_range(0, value_count + 2) as usize;
            let mut script =
                ExpectationScript::new().values(values.iter().take(read).cloned());
            if read > values.len() {
                script = script.value("missing".to_string());
            }
            let tails = [0, 1, 2, 3];
            match rng.choose(&tails).copied().unwrap_or(0) {
                1 => script.completion(),
                2 => script.timeout(Duration::from_millis(rng.random_range(1, 500))),
                3 => script.ignore_remaining(),
                _ => script,
            }
        })
        .collect();

    Scenario {
        name: format!("random-hot-{seed}"),
        description: format!(
            "{value_count} values, {consumer_count} consumers, close: {closes}"
        ),
        stream: StreamSpec::Hot,
        producer,
        consumers,
        // Only determinism is checked for generated scenarios
        expected: ExpectedVerdict::Pass,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scenarios_reach_expected_verdicts() {
        let harness = StreamTestHarness::default();

        for scenario in builtin_scenarios() {
            let outcome = scenario.check(&harness).unwrap();
            assert!(
                outcome.matched,
                "{} expected {} but got {}",
                scenario.name,
                scenario.expected,
                outcome.report.verdict
            );
        }
    }

    #[test]
    fn test_scenario_names_are_unique() {
        let scenarios = builtin_scenarios();
        for scenario in &scenarios {
            let count = scenarios
                .iter()
                .filter(|other| other.name == scenario.name)
                .count();
            assert_eq!(count, 1, "duplicate scenario {}", scenario.name);
        }
        assert!(find_scenario("cold-exact").is_some());
        assert!(find_scenario("no-such-scenario").is_none());
    }

    #[test]
    fn test_random_scenario_is_seed_stable() {
        let first = random_hot_scenario(7);
        let second = random_hot_scenario(7);

        assert_eq!(first.producer, second.producer);
        assert_eq!(first.consumers, second.consumers);
        assert_eq!(first.description, second.description);
    }
}
