//! Test case corpus parser
//!
//! A corpus is a plain text document:
//!
//! ```text
//! <input 1>|||<expected 1>
//! ---
//! <input 2>|||<expected 2>
//! ```
//!
//! Test case authors are end users, so the parser is permissive: a segment
//! that does not split into exactly one input and one expected output is
//! dropped with a warning instead of failing the whole corpus.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::HarnessError;

/// Separates test cases
pub const CASE_DELIMITER: &str = "\n---\n";
/// Separates input from expected output within a test case
pub const IO_DELIMITER: &str = "|||";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub input: String,
    pub expected: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected: expected.into(),
        }
    }
}

/// Ordered test cases, plus the number of malformed segments that were dropped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCorpus {
    cases: Vec<TestCase>,
    skipped: usize,
}

impl TestCorpus {
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Number of malformed segments dropped while parsing
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Parse a corpus document into test cases, in document order
pub fn parse_corpus(content: &str) -> TestCorpus {
    let content = content.replace("\r\n", "\n");
    let mut corpus = TestCorpus::default();

    for (idx, segment) in content.split(CASE_DELIMITER).enumerate() {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let parts: Vec<&str> = segment.split(IO_DELIMITER).collect();
        if parts.len() != 2 {
            warn!(
                "Skipping malformed test case segment #{}: expected 1 '{}' separator, found {}",
                idx + 1,
                IO_DELIMITER,
                parts.len() - 1
            );
            corpus.skipped += 1;
            continue;
        }

        corpus
            .cases
            .push(TestCase::new(parts[0].trim(), parts[1].trim()));
    }

    if corpus.skipped > 0 {
        warn!(
            "Dropped {} malformed test case segment(s); {} test case(s) remain",
            corpus.skipped,
            corpus.cases.len()
        );
    }
    debug!("Parsed {} test case(s)", corpus.cases.len());

    corpus
}

/// Read and parse a corpus file
pub async fn load_corpus(path: impl AsRef<Path>) -> Result<TestCorpus, HarnessError> {
    let path = path.as_ref();
    let content =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| HarnessError::CorpusUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
    Ok(parse_corpus(&content))
}
