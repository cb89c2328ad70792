//! Fatal harness errors
//!
//! Only conditions that abort the run before any case is attempted live here.
//! Everything that goes wrong inside a single case is folded into that case's report.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Failed to read test case corpus {path}: {source}")]
    CorpusUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Target script not found: {0}")]
    TargetMissing(PathBuf),

    #[error("Invalid configuration value for {key}: {value:?} ({reason})")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl HarnessError {
    /// Process exit code reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::CorpusUnreadable { .. } => 2,
            HarnessError::TargetMissing(_) => 3,
            HarnessError::InvalidConfig { .. } => 4,
        }
    }
}
