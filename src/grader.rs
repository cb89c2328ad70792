//! Grader module
//!
//! Turns one test case and the execution result of running the target on it
//! into a `CaseReport`. Grading is a pure function of its inputs and never fails.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::report::CaseReport;
use crate::runner::{ExecutionResult, ExitStatus};
use crate::testcase::TestCase;
use crate::verdict::CaseStatus;

/// `actual` value reported for a timed out case
pub const TIMEOUT_ACTUAL: &str = "Timeout";

/// Output comparison policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareMode {
    /// Trim leading and trailing whitespace of the whole output
    #[default]
    Trim,
    /// Trim trailing whitespace of every line and drop trailing blank lines
    Lines,
    /// Byte-for-byte comparison
    Exact,
}

impl CompareMode {
    pub fn normalize<'a>(&self, output: &'a str) -> Cow<'a, str> {
        match self {
            CompareMode::Trim => Cow::Borrowed(output.trim()),
            CompareMode::Lines => {
                let mut lines: Vec<&str> = output.lines().map(str::trim_end).collect();
                while lines.last().map(|s| s.is_empty()).unwrap_or(false) {
                    lines.pop();
                }
                Cow::Owned(lines.join("\n"))
            }
            CompareMode::Exact => Cow::Borrowed(output),
        }
    }
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareMode::Trim => "trim",
            CompareMode::Lines => "lines",
            CompareMode::Exact => "exact",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trim" => Ok(CompareMode::Trim),
            "lines" => Ok(CompareMode::Lines),
            "exact" => Ok(CompareMode::Exact),
            other => Err(format!(
                "unknown compare mode '{}', expected one of: trim, lines, exact",
                other
            )),
        }
    }
}

/// Compare program output with expected output under `mode`
pub fn compare_output(actual: &str, expected: &str, mode: CompareMode) -> bool {
    mode.normalize(actual) == mode.normalize(expected)
}

/// Grade one execution of `case`
pub fn grade(case: &TestCase, result: &ExecutionResult, mode: CompareMode) -> CaseReport {
    let (actual, status, error) = match result.exit_status {
        ExitStatus::Completed => {
            let matched = compare_output(&result.stdout, &case.expected, mode);
            let actual = mode.normalize(&result.stdout).into_owned();
            debug!(
                "Comparing: actual={:?} expected={:?} exit_code={:?} passed={}",
                actual, case.expected, result.exit_code, matched
            );

            let stderr = result.stderr.trim();
            let error = if stderr.is_empty() {
                None
            } else {
                Some(stderr.to_string())
            };
            let status = if matched {
                CaseStatus::Passed
            } else {
                CaseStatus::Failed
            };
            (actual, status, error)
        }
        ExitStatus::TimedOut => (
            TIMEOUT_ACTUAL.to_string(),
            CaseStatus::Failed,
            result.error.clone(),
        ),
        ExitStatus::LaunchFailed => (
            String::new(),
            CaseStatus::Failed,
            Some(
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Failed to launch target".to_string()),
            ),
        ),
    };

    CaseReport {
        input: case.input.clone(),
        expected: case.expected.clone(),
        actual,
        status,
        memory_kb: result.peak_memory_kb,
        runtime_ms: result.wall_time_ms,
        error,
    }
}
