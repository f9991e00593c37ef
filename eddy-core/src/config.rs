//! Centralized configuration for Eddy.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the scheduler and harness.

/// Central configuration for all Eddy components.
///
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EddyConfig {
    pub scheduler: SchedulerConfig,
    pub harness: HarnessConfig,
}

/// Cooperative scheduler limits and virtual-time behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum task steps before an unfinished run is reported as stalled
    pub round_quota: u64,
    /// Jump the virtual clock to the next deadline whenever all tasks are idle.
    ///
    /// Only honored by direct scheduler use; the stream test harness always
    /// advances time itself.
    pub auto_advance: bool,
    /// Maximum number of trace entries retained per run
    pub trace_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            round_quota: 10_000,
            auto_advance: true,
            trace_capacity: 10_000,
        }
    }
}

/// Verdict policy of the stream test harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Report values left unread after the expectation script is exhausted
    pub fail_on_unconsumed: bool,
    /// Cancel every harness subscription once the verdict is decided
    pub cancel_on_teardown: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            fail_on_unconsumed: true,
            cancel_on_teardown: true,
        }
    }
}

/// Configuration values that cannot drive a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl EddyConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(quota) = std::env::var("EDDY_ROUND_QUOTA")
            && let Ok(rounds) = quota.parse::<u64>()
        {
            config.scheduler.round_quota = rounds;
        }

        if let Ok(auto_advance) = std::env::var("EDDY_AUTO_ADVANCE")
            && let Ok(enabled) = auto_advance.parse::<bool>()
        {
            config.scheduler.auto_advance = enabled;
        }

        if let Ok(capacity) = std::env::var("EDDY_TRACE_CAPACITY")
            && let Ok(entries) = capacity.parse::<usize>()
        {
            config.scheduler.trace_capacity = entries;
        }

        if let Ok(strict) = std::env::var("EDDY_FAIL_ON_UNCONSUMED")
            && let Ok(enabled) = strict.parse::<bool>()
        {
            config.harness.fail_on_unconsumed = enabled;
        }

        config
    }

    /// Creates a configuration with a small quota so hangs surface quickly.
    pub fn for_testing() -> Self {
        Self {
            scheduler: SchedulerConfig {
                round_quota: 1_000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Creates a configuration that keeps long traces for post-mortem reading.
    pub fn for_debugging() -> Self {
        Self {
            scheduler: SchedulerConfig {
                round_quota: 100_000,
                trace_capacity: 100_000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Checks that the configuration can drive a run.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidValue` - Quota or trace capacity is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.round_quota == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.round_quota",
                reason: "must allow at least one round".to_string(),
            });
        }
        if self.scheduler.trace_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.trace_capacity",
                reason: "must retain at least one entry".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = EddyConfig::default();

        assert_eq!(config.scheduler.round_quota, 10_000);
        assert!(config.scheduler.auto_advance);
        assert_eq!(config.scheduler.trace_capacity, 10_000);
        assert!(config.harness.fail_on_unconsumed);
        assert!(config.harness.cancel_on_teardown);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_presets() {
        let testing = EddyConfig::for_testing();
        assert_eq!(testing.scheduler.round_quota, 1_000);
        assert!(testing.harness.fail_on_unconsumed);

        let debugging = EddyConfig::for_debugging();
        assert!(debugging.scheduler.round_quota > testing.scheduler.round_quota);
        assert_eq!(debugging.scheduler.trace_capacity, 100_000);
    }

    #[test]
    fn test_zero_quota_is_invalid() {
        let mut config = EddyConfig::default();
        config.scheduler.round_quota = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "scheduler.round_quota",
                ..
            })
        ));
    }
}
