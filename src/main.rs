mod config;
mod error;
mod grader;
mod harness;
mod languages;
mod report;
mod runner;
mod testcase;
mod verdict;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{parse_command, HarnessConfig};
use crate::error::HarnessError;
use crate::grader::CompareMode;
use crate::harness::Harness;
use crate::languages::RuntimeTable;
use crate::runner::{CommandSpec, ProcessRunner};
use crate::testcase::load_corpus;

/// Run a target script against a test case corpus and print a JSON report
#[derive(Debug, Parser)]
#[command(name = "gradebox", version)]
struct Cli {
    /// Test case corpus (`input|||expected` blocks separated by `---` lines)
    corpus: PathBuf,

    /// Target script to grade
    target: PathBuf,

    /// Wall-clock budget per test case, in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: Option<u64>,

    /// Memory sampling interval, in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    sample_interval_ms: Option<u64>,

    /// Output comparison policy: trim, lines or exact
    #[arg(long, value_name = "MODE")]
    compare: Option<CompareMode>,

    /// Command used to launch the target (e.g. "python3 -u"); overrides the runtime table
    #[arg(long)]
    run_command: Option<String>,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gradebox=info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<HarnessError>()
                .map(HarnessError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let target = resolve_target(&cli.target).await?;
    let corpus = load_corpus(&cli.corpus).await?;
    info!(
        "Loaded {} test case(s) from {}",
        corpus.len(),
        cli.corpus.display()
    );
    if corpus.is_empty() {
        warn!("Corpus contains no test cases, report will be empty");
    }

    let launcher = match &config.run_command {
        Some(command) => command.clone(),
        None => RuntimeTable::builtin()?.launcher_for(&target),
    };
    let command = CommandSpec::for_target(&launcher, &target);

    let harness = Harness::new(Arc::new(ProcessRunner::new()), command, &config);
    let report = harness.run_corpus(&corpus).await;

    match &cli.output {
        Some(path) => {
            report.save(path)?;
            info!(
                "Report with {} case(s) written to {}",
                report.len(),
                path.display()
            );
        }
        None => report.write_to(std::io::stdout().lock())?,
    }

    Ok(())
}

/// Environment (and `.env`) first, then command line flags
fn build_config(cli: &Cli) -> Result<HarnessConfig, HarnessError> {
    let mut config = HarnessConfig::from_env()?;

    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_timeout_ms(timeout_ms);
    }
    if let Some(interval_ms) = cli.sample_interval_ms {
        config = config.with_sample_interval_ms(interval_ms);
    }
    if let Some(mode) = cli.compare {
        config = config.with_compare_mode(mode);
    }
    if let Some(command) = &cli.run_command {
        config = config.with_run_command(parse_command("--run-command", command)?);
    }

    Ok(config)
}

/// Absolute path of the target; the child runs from the target's directory
async fn resolve_target(target: &Path) -> Result<PathBuf, HarnessError> {
    match tokio::fs::metadata(target).await {
        Ok(meta) if meta.is_file() => tokio::fs::canonicalize(target)
            .await
            .map_err(|_| HarnessError::TargetMissing(target.to_path_buf())),
        _ => Err(HarnessError::TargetMissing(target.to_path_buf())),
    }
}
