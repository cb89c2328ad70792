//! Runner module - Execution abstraction layer
//!
//! This module launches the target program once per test case:
//! - `ProcessRunner`: spawns a child process, feeds stdin, enforces the timeout
//! - `monitor`: samples the child's resident memory while it runs
//!
//! The runner module does NOT:
//! - Compare outputs or decide pass/fail
//! - Know about corpus or report formats

pub mod monitor;
pub mod process;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command specification for execution
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
        }
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        let args: Vec<String> = iter.cloned().collect();
        Self {
            program,
            args,
            work_dir: None,
        }
    }

    /// Build the command that runs `target` through `launcher` (e.g. `python3 -u`).
    /// An empty launcher executes the target directly.
    pub fn for_target(launcher: &[String], target: &Path) -> Self {
        let target_str = target.to_string_lossy().into_owned();
        let mut spec = if launcher.is_empty() {
            Self::new(target_str)
        } else {
            let mut spec = Self::from_vec(launcher);
            spec.args.push(target_str);
            spec
        };
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            spec.work_dir = Some(parent.to_path_buf());
        }
        spec
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.clone());
        v
    }
}

/// Resource limits for one execution
#[derive(Debug, Clone, PartialEq)]
pub struct RunLimits {
    /// Wall-clock budget
    pub timeout: Duration,
    /// Memory sampling interval
    pub sample_interval: Duration,
    /// How long to wait for the memory monitor after the process is gone
    pub monitor_grace: Duration,
}

impl From<&crate::config::HarnessConfig> for RunLimits {
    fn from(config: &crate::config::HarnessConfig) -> Self {
        Self {
            timeout: config.timeout(),
            sample_interval: config.sample_interval(),
            monitor_grace: config.monitor_grace(),
        }
    }
}

/// How the execution ended (raw, no pass/fail interpretation)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// Process ran to completion (any exit code)
    Completed,
    /// Wall-clock budget exhausted, process was killed
    TimedOut,
    /// Process could not be started
    LaunchFailed,
}

/// Outcome of running the target once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Stdout content (lossy UTF-8)
    pub stdout: String,
    /// Stderr content (lossy UTF-8)
    pub stderr: String,
    /// Execution status
    pub exit_status: ExitStatus,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Wall-clock time in milliseconds
    pub wall_time_ms: u64,
    /// Peak resident memory in KB (0 when unavailable)
    pub peak_memory_kb: u64,
    /// Timeout or launch error description
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn completed(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
        wall_time_ms: u64,
        peak_memory_kb: u64,
    ) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status: ExitStatus::Completed,
            exit_code,
            wall_time_ms,
            peak_memory_kb,
            error: None,
        }
    }

    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_status: ExitStatus::TimedOut,
            exit_code: None,
            wall_time_ms: timeout.as_millis() as u64,
            peak_memory_kb: 0,
            error: Some(timeout_message(timeout)),
        }
    }

    pub fn launch_failed(error: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_status: ExitStatus::LaunchFailed,
            exit_code: None,
            wall_time_ms: 0,
            peak_memory_kb: 0,
            error: Some(error.into()),
        }
    }
}

/// Message reported for a timed out execution, e.g. "Execution timed out after 5 seconds"
pub fn timeout_message(timeout: Duration) -> String {
    let millis = timeout.as_millis();
    if millis % 1000 == 0 {
        let secs = millis / 1000;
        let unit = if secs == 1 { "second" } else { "seconds" };
        format!("Execution timed out after {} {}", secs, unit)
    } else {
        format!("Execution timed out after {} ms", millis)
    }
}

/// Runner trait for executing the target program
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command with the given limits, feeding `stdin` as its complete input.
    ///
    /// Launch failures and timeouts are reported in-band through `ExitStatus`;
    /// `Err` is reserved for unexpected failures while talking to the process.
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: &str,
    ) -> Result<ExecutionResult>;
}

// Re-exports
pub use process::ProcessRunner;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_for_target_with_launcher() {
        let launcher = vec!["python3".to_string(), "-u".to_string()];
        let cmd = CommandSpec::for_target(&launcher, Path::new("/work/main.py"));

        assert_eq!(cmd.program, "python3");
        assert_eq!(cmd.args, vec!["-u", "/work/main.py"]);
        assert_eq!(cmd.work_dir, Some(PathBuf::from("/work")));
    }

    #[test]
    fn test_command_for_target_direct() {
        let cmd = CommandSpec::for_target(&[], Path::new("main"));
        assert_eq!(cmd.to_vec(), vec!["main"]);
        assert_eq!(cmd.work_dir, None);
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            timeout_message(Duration::from_secs(5)),
            "Execution timed out after 5 seconds"
        );
        assert_eq!(
            timeout_message(Duration::from_secs(1)),
            "Execution timed out after 1 second"
        );
        assert_eq!(
            timeout_message(Duration::from_millis(300)),
            "Execution timed out after 300 ms"
        );
    }

    #[test]
    fn test_timed_out_result_metrics() {
        let result = ExecutionResult::timed_out(Duration::from_secs(5));
        assert_eq!(result.exit_status, ExitStatus::TimedOut);
        assert_eq!(result.wall_time_ms, 5000);
        assert_eq!(result.peak_memory_kb, 0);
        assert_eq!(result.exit_code, None);
    }
}
