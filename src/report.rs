//! Report aggregation
//!
//! One `CaseReport` per test case, kept in corpus order, serialized once as a
//! JSON array when the run is over.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::testcase::TestCase;
use crate::verdict::CaseStatus;

/// Graded result of a single test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub status: CaseStatus,
    /// Peak resident memory in KB
    #[serde(rename = "memory")]
    pub memory_kb: u64,
    /// Wall-clock time in milliseconds
    #[serde(rename = "runtime")]
    pub runtime_ms: u64,
    pub error: Option<String>,
}

impl CaseReport {
    /// Failed report for a case whose run or grading broke unexpectedly
    pub fn internal_error(case: &TestCase, error: impl Into<String>) -> Self {
        Self {
            input: case.input.clone(),
            expected: case.expected.clone(),
            actual: String::new(),
            status: CaseStatus::Failed,
            memory_kb: 0,
            runtime_ms: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

/// All case reports of a run, in corpus order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinalReport {
    cases: Vec<CaseReport>,
}

impl FinalReport {
    #[cfg(test)]
    pub fn cases(&self) -> &[CaseReport] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn summary(&self) -> ReportSummary {
        let passed = self.cases.iter().filter(|c| c.status.is_passed()).count();
        ReportSummary {
            total: self.cases.len(),
            passed,
            failed: self.cases.len() - passed,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize report")
    }

    /// Write the report as a single JSON document followed by a newline
    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        let json = self.to_json()?;
        writer
            .write_all(json.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .context("Failed to write report")
    }

    /// Write the report to `path`, replacing it in one step
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create report file in {}", dir.display()))?;
        self.write_to(&mut file)?;
        file.persist(path)
            .with_context(|| format!("Failed to save report to {}", path.display()))?;
        Ok(())
    }
}

/// Collects case reports in the order they are pushed
#[derive(Debug, Default)]
pub struct ReportAggregator {
    cases: Vec<CaseReport>,
}

impl ReportAggregator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cases: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, report: CaseReport) {
        self.cases.push(report);
    }

    pub fn finish(self) -> FinalReport {
        FinalReport { cases: self.cases }
    }
}
