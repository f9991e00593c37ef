//! CLI command implementations

use std::collections::BTreeMap;

use anyhow::{Context, bail};
use clap::Subcommand;
use eddy_core::config::EddyConfig;
use eddy_core::{PushService, SharedStream};
use eddy_sim::{
    ScenarioOutcome, StreamTestHarness, builtin_scenarios, find_scenario, random_hot_scenario,
};
use futures::StreamExt;
use tracing::{debug, info};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List built-in scenarios
    List,
    /// Run one built-in scenario
    Run {
        /// Scenario name, see `eddy list`
        scenario: String,
        /// Scheduling rounds before the run is reported as stalled
        #[arg(short, long)]
        quota: Option<u64>,
        /// Print the full scheduling trace
        #[arg(long)]
        trace: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run every built-in scenario and check its verdict
    All {
        #[arg(short, long)]
        quota: Option<u64>,
    },
    /// Run seeded random scenarios twice each and compare the results
    Fuzz {
        /// First seed
        #[arg(short, long, default_value = "0")]
        seed: u64,
        /// Number of seeds to try
        #[arg(short, long, default_value = "100")]
        runs: u64,
    },
    /// Broadcast values to concurrent subscribers on real threads
    Multicast {
        /// Number of subscribers
        #[arg(short, long, default_value = "3")]
        subscribers: usize,
        /// Values to push
        #[arg(default_values_t = ["Asset1".to_string(), "Asset2".to_string()])]
        values: Vec<String>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns an error when a scenario misses its expected verdict, the harness
/// is misused, or the multicast demo loses a subscriber task
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::List => list_scenarios(),
        Commands::Run {
            scenario,
            quota,
            trace,
            json,
        } => run_scenario(&scenario, quota, trace, json),
        Commands::All { quota } => run_all(quota),
        Commands::Fuzz { seed, runs } => fuzz(seed, runs),
        Commands::Multicast {
            subscribers,
            values,
        } => multicast(subscribers, values).await,
    }
}

fn harness(quota: Option<u64>) -> StreamTestHarness {
    let harness = StreamTestHarness::new(EddyConfig::from_env());
    match quota {
        Some(quota) => harness.with_round_quota(quota),
        None => harness,
    }
}

fn list_scenarios() -> anyhow::Result<()> {
    for scenario in builtin_scenarios() {
        println!(
            "{:<32} {:<32} {}",
            scenario.name,
            scenario.expected.to_string(),
            scenario.description
        );
    }
    Ok(())
}

/// Run a single scenario
///
/// # Errors
/// - Unknown scenario name
/// - `HarnessError` - Invalid configuration
/// - Verdict differs from the expected one
fn run_scenario(name: &str, quota: Option<u64>, trace: bool, json: bool) -> anyhow::Result<()> {
    let scenario = find_scenario(name)
        .with_context(|| format!("Unknown scenario '{name}', see `eddy list`"))?;
    let outcome = scenario.check(&harness(quota))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("Scenario: {} - {}", scenario.name, scenario.description);
        println!("Expected: {}", scenario.expected);
        print!("{}", outcome.report.summary());
        if trace {
            println!("\nTrace:");
            print!("{}", outcome.report.trace);
        }
    }

    if !outcome.matched {
        bail!(
            "Scenario '{}' expected {} but got {}",
            scenario.name,
            scenario.expected,
            outcome.report.verdict
        );
    }
    Ok(())
}

fn print_outcome(outcome: &ScenarioOutcome) {
    let status = if outcome.matched { "ok" } else { "MISMATCH" };
    println!(
        "{:<8} {:<32} expected {:<32} got {}",
        status,
        outcome.scenario,
        outcome.expected.to_string(),
        outcome.report.verdict.label()
    );
}

/// Run every built-in scenario
///
/// # Errors
/// - `HarnessError` - Invalid configuration
/// - At least one verdict differs from the expected one
fn run_all(quota: Option<u64>) -> anyhow::Result<()> {
    let harness = harness(quota);
    let mut mismatches = 0;

    for scenario in builtin_scenarios() {
        let outcome = scenario.check(&harness)?;
        print_outcome(&outcome);
        if !outcome.matched {
            mismatches += 1;
        }
    }

    if mismatches > 0 {
        bail!("{mismatches} scenarios missed their expected verdict");
    }
    info!("All built-in scenarios reached their expected verdicts");
    Ok(())
}

/// Run seeded scenarios twice and compare verdict and trace
///
/// # Errors
/// - `HarnessError` - Invalid configuration
/// - Two runs of the same seed differ
fn fuzz(seed: u64, runs: u64) -> anyhow::Result<()> {
    let harness = harness(None);
    let mut verdicts: BTreeMap<&'static str, u64> = BTreeMap::new();

    for offset in 0..runs {
        let seed = seed.wrapping_add(offset);
        let scenario = random_hot_scenario(seed);
        debug!("Fuzzing {}: {}", scenario.name, scenario.description);

        let first = scenario.run(&harness)?;
        let second = scenario.run(&harness)?;
        if first != second {
            bail!(
                "Seed {seed} is not deterministic: {} vs {}",
                first.verdict,
                second.verdict
            );
        }
        *verdicts.entry(first.verdict.label()).or_default() += 1;
    }

    println!("{runs} seeds starting at {seed}, every run reproduced exactly");
    for (label, count) in verdicts {
        println!("  {label:<8} {count}");
    }
    Ok(())
}

/// Push values through the threaded backend to concurrent subscribers
///
/// # Errors
/// - A subscriber task panicked
/// - The broadcaster rejected a push
async fn multicast(subscribers: usize, values: Vec<String>) -> anyhow::Result<()> {
    let stream = SharedStream::new_hot();
    let Some(broadcaster) = stream.broadcaster() else {
        bail!("Hot stream has no broadcaster");
    };

    let handles: Vec<_> = (0..subscribers)
        .map(|index| {
            let subscription = stream.subscribe();
            tokio::spawn(async move { (index, subscription.collect::<Vec<String>>().await) })
        })
        .collect();

    let mut push = broadcaster.clone();
    for value in values {
        let outcome = push.push(value.clone())?;
        info!("Pushed {} to {} subscribers", value, outcome.delivered);
    }
    broadcaster.close();

    for handle in handles {
        let (index, received) = handle.await?;
        println!("subscriber {index} received {received:?}");
    }
    Ok(())
}
