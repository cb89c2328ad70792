//! Harness configuration
//!
//! Defaults, overridden by environment variables (a `.env` file is honored),
//! overridden in turn by command line flags.

use std::time::Duration;

use tracing::warn;

use crate::error::HarnessError;
use crate::grader::CompareMode;

pub const ENV_TIMEOUT_MS: &str = "GRADEBOX_TIMEOUT_MS";
pub const ENV_SAMPLE_INTERVAL_MS: &str = "GRADEBOX_SAMPLE_INTERVAL_MS";
pub const ENV_COMPARE_MODE: &str = "GRADEBOX_COMPARE_MODE";
pub const ENV_RUN_COMMAND: &str = "GRADEBOX_RUN_COMMAND";
pub const ENV_MONITOR_GRACE_MS: &str = "GRADEBOX_MONITOR_GRACE_MS";

/// Upper bound for how long the memory monitor may linger after the process exits
pub const MAX_MONITOR_GRACE_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Wall-clock budget per test case in milliseconds (default: 5000ms)
    pub timeout_ms: u64,
    /// Memory sampling interval in milliseconds (default: 100ms)
    pub sample_interval_ms: u64,
    /// Grace period for joining the memory monitor (at most 500ms)
    pub monitor_grace_ms: u64,
    /// Output comparison policy
    pub compare_mode: CompareMode,
    /// Explicit run command; the runtime table is consulted when unset
    pub run_command: Option<Vec<String>>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            sample_interval_ms: 100,
            monitor_grace_ms: MAX_MONITOR_GRACE_MS,
            compare_mode: CompareMode::Trim,
            run_command: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from process environment
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` to resolve variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HarnessError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            config.timeout_ms = parse_millis(ENV_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_SAMPLE_INTERVAL_MS) {
            config.sample_interval_ms = parse_millis(ENV_SAMPLE_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_MONITOR_GRACE_MS) {
            config = config.with_monitor_grace_ms(parse_millis(ENV_MONITOR_GRACE_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_COMPARE_MODE) {
            config.compare_mode =
                value
                    .parse()
                    .map_err(|reason: String| HarnessError::InvalidConfig {
                        key: ENV_COMPARE_MODE,
                        value: value.clone(),
                        reason,
                    })?;
        }
        if let Some(value) = lookup(ENV_RUN_COMMAND) {
            config.run_command = Some(parse_command(ENV_RUN_COMMAND, &value)?);
        }

        Ok(config)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_sample_interval_ms(mut self, interval_ms: u64) -> Self {
        self.sample_interval_ms = interval_ms;
        self
    }

    pub fn with_compare_mode(mut self, mode: CompareMode) -> Self {
        self.compare_mode = mode;
        self
    }

    pub fn with_run_command(mut self, command: Vec<String>) -> Self {
        self.run_command = Some(command);
        self
    }

    pub fn with_monitor_grace_ms(mut self, grace_ms: u64) -> Self {
        if grace_ms > MAX_MONITOR_GRACE_MS {
            warn!(
                "Monitor grace period {}ms exceeds {}ms, clamping",
                grace_ms, MAX_MONITOR_GRACE_MS
            );
        }
        self.monitor_grace_ms = grace_ms.min(MAX_MONITOR_GRACE_MS);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn monitor_grace(&self) -> Duration {
        Duration::from_millis(self.monitor_grace_ms.min(MAX_MONITOR_GRACE_MS))
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<u64, HarnessError> {
    let millis = value
        .trim()
        .parse::<u64>()
        .map_err(|e| HarnessError::InvalidConfig {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })?;
    if millis == 0 {
        return Err(HarnessError::InvalidConfig {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(millis)
}

/// Split a run command on whitespace (e.g. "python3 -u")
pub fn parse_command(key: &'static str, value: &str) -> Result<Vec<String>, HarnessError> {
    let command: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if command.is_empty() {
        return Err(HarnessError::InvalidConfig {
            key,
            value: value.to_string(),
            reason: "run command is empty".into(),
        });
    }
    Ok(command)
}
