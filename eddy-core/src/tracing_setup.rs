//! Log routing for the eddy binary and harness runs.
//!
//! The console shows what the user asked for. Every event, down to individual
//! scheduling decisions, also lands in a per-run file next to the workspace.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{Level, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Name of the file that receives the full trace of the most recent run.
pub const RUN_LOG_FILE: &str = "eddy-last-run.log";

const DEFAULT_LOGS_DIR: &str = "logs";

/// Installs the global subscriber and returns the path of the run log.
///
/// `RUST_LOG` overrides `console_level` for the console only. The run log is
/// truncated on every call and always records at trace level.
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - Run log could not be created, or a global
///   subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let (run_log, path) = open_run_log(logs_dir.unwrap_or_else(|| Path::new(DEFAULT_LOGS_DIR)))?;

    tracing_subscriber::registry()
        .with(console_output(console_level))
        .with(run_log_output(run_log))
        .try_init()?;

    tracing::info!("Logging to console at {console_level}, full trace in {}", path.display());
    Ok(path)
}

fn open_run_log(dir: &Path) -> io::Result<(File, PathBuf)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(RUN_LOG_FILE);
    let file = File::create(&path)?;
    Ok((file, path))
}

fn console_output<S>(level: Level) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    fmt::layer()
        .with_writer(io::stderr)
        .with_file(false)
        .with_line_number(false)
        .with_filter(filter)
}

fn run_log_output<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(EnvFilter::new(Level::TRACE.as_str()))
}

/// Verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Includes every scheduler round and wakeup
    Trace,
}

impl CliLogLevel {
    /// Maps the flag onto a tracing level.
    ///
    /// ```
    /// use eddy_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Warn.as_tracing_level(), tracing::Level::WARN);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            Self::Error => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    /// Prints the lowercase directive `EnvFilter` understands.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_tracing_level().as_str().to_ascii_lowercase())
    }
}
