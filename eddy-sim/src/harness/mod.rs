//! Stream test harness.
//!
//! Composes a stream, one scripted consumer per expectation script and an
//! optional scripted producer on a fresh [`CooperativeScheduler`], runs them
//! in virtual time and turns the outcome into a [`Verdict`]. A run that would
//! hang forever is reported as [`Verdict::Stalled`] instead.

mod expectation;
mod tasks;
mod verdict;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use eddy_core::config::{ConfigError, EddyConfig};
use eddy_core::SubscriptionState;
use thiserror::Error;
use tracing::{debug, info};

use crate::deterministic::{CooperativeScheduler, RunOutcome, SimulationError, TraceEvent};

pub use expectation::{Expectation, ExpectationScript, ProducerScript, ProducerStep};
pub use verdict::{Failure, FailureKind, HarnessReport, Verdict};

use tasks::{ConsumerRecord, ScriptedConsumer, ScriptedProducer};

/// Stream under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSpec<T> {
    /// Replays these values to each consumer, then completes
    Cold(Vec<T>),
    /// Broadcasts whatever the producer script pushes
    Hot,
}

impl<T> StreamSpec<T> {
    pub fn is_hot(&self) -> bool {
        matches!(self, StreamSpec::Hot)
    }
}

/// Harness misuse, reported separately from assertion verdicts.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("At least one expectation script is required")]
    NoConsumers,

    /// Cold streams are fully determined at construction
    #[error("Cold streams take no producer script ({steps} steps given)")]
    ProducerOnColdStream { steps: usize },

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),
}

impl HarnessError {
    /// Checks if this error is caller misuse rather than an internal fault.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            HarnessError::Config(_)
                | HarnessError::NoConsumers
                | HarnessError::ProducerOnColdStream { .. }
        )
    }
}

/// Drives streams against expectation scripts in virtual time.
#[derive(Debug, Clone, Default)]
pub struct StreamTestHarness {
    config: EddyConfig,
}

impl StreamTestHarness {
    pub fn new(config: EddyConfig) -> Self {
        Self { config }
    }

    /// Overrides the scheduler round quota.
    pub fn with_round_quota(mut self, quota: u64) -> Self {
        self.config.scheduler.round_quota = quota;
        self
    }

    pub fn config(&self) -> &EddyConfig {
        &self.config
    }

    /// Runs one consumer against `stream`.
    ///
    /// # Errors
    ///
    /// - `HarnessError::ProducerOnColdStream` - Producer script given for a cold stream
    /// - `HarnessError::Config` - Configuration failed validation
    pub fn run<T>(
        &self,
        stream: StreamSpec<T>,
        producer: ProducerScript<T>,
        expectations: ExpectationScript<T>,
    ) -> Result<HarnessReport<T>, HarnessError>
    where
        T: Clone + PartialEq + fmt::Debug + 'static,
    {
        self.run_many(stream, producer, vec![expectations])
    }

    /// Runs one consumer per expectation script against the same stream.
    ///
    /// Consumers subscribe in script order before the producer runs. The
    /// verdict is the first consumer failure in script order, then any failed
    /// task, then a stall, then values left unread.
    ///
    /// # Errors
    ///
    /// - `HarnessError::NoConsumers` - No expectation scripts given
    /// - `HarnessError::ProducerOnColdStream` - Producer script given for a cold stream
    /// - `HarnessError::Config` - Configuration failed validation
    pub fn run_many<T>(
        &self,
        stream: StreamSpec<T>,
        producer: ProducerScript<T>,
        expectations: Vec<ExpectationScript<T>>,
    ) -> Result<HarnessReport<T>, HarnessError>
    where
        T: Clone + PartialEq + fmt::Debug + 'static,
    {
        self.config.validate()?;
        if expectations.is_empty() {
            return Err(HarnessError::NoConsumers);
        }
        if !stream.is_hot() && !producer.is_empty() {
            return Err(HarnessError::ProducerOnColdStream {
                steps: producer.steps().len(),
            });
        }

        // Scripts have no way to move the clock by hand.
        let mut scheduler_config = self.config.scheduler.clone();
        if !scheduler_config.auto_advance {
            debug!("Ignoring auto_advance = false for a harness run");
            scheduler_config.auto_advance = true;
        }
        let mut scheduler = CooperativeScheduler::new(scheduler_config);
        let stream_id = match stream {
            StreamSpec::Cold(values) => scheduler.registry_mut().create_cold(values),
            StreamSpec::Hot => scheduler.registry_mut().create_hot(),
        };

        let records: Vec<Rc<RefCell<ConsumerRecord<T>>>> = expectations
            .into_iter()
            .enumerate()
            .map(|(index, script)| {
                let record = Rc::new(RefCell::new(ConsumerRecord::default()));
                scheduler.spawn(ScriptedConsumer::new(
                    index,
                    stream_id,
                    script.steps().to_vec(),
                    record.clone(),
                ));
                record
            })
            .collect();
        if !producer.is_empty() {
            scheduler.spawn(ScriptedProducer::new(stream_id, producer.steps().to_vec()));
        }

        debug!(
            "Running {} consumers on {} ({} producer steps)",
            records.len(),
            stream_id,
            producer.steps().len()
        );
        let outcome = scheduler.run()?;
        let verdict = self.decide(&scheduler, &records, outcome);

        if self.config.harness.cancel_on_teardown {
            teardown(&mut scheduler, &records)?;
        }

        info!("Harness verdict: {}", verdict);
        scheduler.note(TraceEvent::Verdict {
            summary: verdict.to_string(),
        });

        let observed = records
            .iter()
            .map(|record| record.borrow().observed.clone())
            .collect();
        let rounds = scheduler.rounds();
        let finished_at = scheduler.now();
        Ok(HarnessReport {
            verdict,
            observed,
            rounds,
            finished_at,
            trace: scheduler.into_trace(),
        })
    }

    fn decide<T>(
        &self,
        scheduler: &CooperativeScheduler<T>,
        records: &[Rc<RefCell<ConsumerRecord<T>>>],
        outcome: RunOutcome,
    ) -> Verdict<T>
    where
        T: Clone + PartialEq + fmt::Debug + 'static,
    {
        if let Some(failure) = records
            .iter()
            .find_map(|record| record.borrow().failure.clone())
        {
            return Verdict::Fail(failure);
        }

        if let Some((_, name, reason)) = scheduler.failed_tasks().into_iter().next() {
            return Verdict::Fail(Failure::TaskFailed {
                task: name.to_string(),
                reason: reason.to_string(),
            });
        }

        if let RunOutcome::Stalled(report) = outcome {
            return Verdict::Stalled(report);
        }

        if self.config.harness.fail_on_unconsumed {
            for (consumer, record) in records.iter().enumerate() {
                let record = record.borrow();
                let Some(subscription) = record.subscription else {
                    continue;
                };
                let values = scheduler.registry().unconsumed(subscription);
                if record.script_done && !values.is_empty() {
                    return Verdict::Fail(Failure::UnconsumedValues { consumer, values });
                }
            }
        }

        Verdict::Pass
    }
}

/// Cancels every consumer subscription still live after the run.
fn teardown<T>(
    scheduler: &mut CooperativeScheduler<T>,
    records: &[Rc<RefCell<ConsumerRecord<T>>>],
) -> Result<(), SimulationError>
where
    T: Clone + fmt::Debug + 'static,
{
    for record in records {
        let Some(subscription) = record.borrow().subscription else {
            continue;
        };
        let live = scheduler
            .registry()
            .subscription(subscription)
            .is_some_and(|sub| sub.state() != SubscriptionState::Cancelled);
        if live {
            scheduler.cancel(subscription)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
