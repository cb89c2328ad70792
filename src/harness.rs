//! Harness module - drives a grading pass over a corpus
//!
//! Cases run one after another so one case's resource usage can never leak
//! into another's measurement. Each case runs in its own task; whatever goes
//! wrong inside it (error or panic) becomes a failed report for that case only.

use std::any::Any;
use std::sync::Arc;

use tracing::{error, info};

use crate::config::HarnessConfig;
use crate::grader::{grade, CompareMode};
use crate::report::{CaseReport, FinalReport, ReportAggregator};
use crate::runner::{CommandSpec, RunLimits, Runner};
use crate::testcase::{TestCase, TestCorpus};

pub struct Harness {
    runner: Arc<dyn Runner>,
    command: CommandSpec,
    limits: RunLimits,
    compare_mode: CompareMode,
}

impl Harness {
    pub fn new(runner: Arc<dyn Runner>, command: CommandSpec, config: &HarnessConfig) -> Self {
        Self {
            runner,
            command,
            limits: RunLimits::from(config),
            compare_mode: config.compare_mode,
        }
    }

    /// Grade every case of `corpus`, in corpus order
    pub async fn run_corpus(&self, corpus: &TestCorpus) -> FinalReport {
        let total = corpus.len();
        let mut aggregator = ReportAggregator::with_capacity(total);

        info!(
            "Grading {} test case(s) with {:?}",
            total,
            self.command.to_vec()
        );

        for (idx, case) in corpus.cases().iter().enumerate() {
            info!(
                "Running test case {}/{} with input: {:?}",
                idx + 1,
                total,
                case.input
            );

            let report = self.run_case(case).await;

            info!(
                "Test case {}/{}: {} (runtime={}ms, memory={}KB)",
                idx + 1,
                total,
                report.status,
                report.runtime_ms,
                report.memory_kb
            );
            aggregator.push(report);
        }

        let report = aggregator.finish();
        let summary = report.summary();
        info!(
            "Grading finished: total={}, passed={}, failed={}, skipped_segments={}",
            summary.total,
            summary.passed,
            summary.failed,
            corpus.skipped()
        );

        report
    }

    /// Run and grade a single case; never fails
    pub async fn run_case(&self, case: &TestCase) -> CaseReport {
        let runner = Arc::clone(&self.runner);
        let command = self.command.clone();
        let limits = self.limits.clone();
        let mode = self.compare_mode;
        let task_case = case.clone();

        let handle = tokio::spawn(async move {
            let result = runner.run(&command, &limits, &task_case.input).await?;
            Ok::<_, anyhow::Error>(grade(&task_case, &result, mode))
        });

        match handle.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!("Error during test execution: {:#}", e);
                CaseReport::internal_error(case, format!("{:#}", e))
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!("Test case task panicked: {}", message);
                CaseReport::internal_error(case, message)
            }
            Err(e) => {
                error!("Test case task was cancelled: {}", e);
                CaseReport::internal_error(case, e.to_string())
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test case task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ExecutionResult, ProcessRunner};
    use crate::testcase::parse_corpus;
    use crate::verdict::CaseStatus;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Echoes the input back; a few inputs trigger failure paths
    struct ScriptedRunner;

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn run(
            &self,
            _cmd: &CommandSpec,
            limits: &RunLimits,
            stdin: &str,
        ) -> Result<ExecutionResult> {
            match stdin {
                "panic" => panic!("runner exploded"),
                "error" => anyhow::bail!("pipe closed unexpectedly"),
                "hang" => Ok(ExecutionResult::timed_out(limits.timeout)),
                "missing" => Ok(ExecutionResult::launch_failed("Failed to launch target")),
                other => {
                    // Later cases finish first
                    let delay = 50u64.saturating_sub(other.len() as u64 * 10);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok(ExecutionResult::completed(
                        format!("{}\n", other),
                        "",
                        Some(0),
                        delay,
                        512,
                    ))
                }
            }
        }
    }

    fn scripted_harness() -> Harness {
        Harness::new(
            Arc::new(ScriptedRunner),
            CommandSpec::new("target"),
            &HarnessConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_report_order_matches_corpus() {
        let corpus = parse_corpus("a|||a\n---\nbb|||bb\n---\nccc|||ccc\n---\ndddd|||x");
        let report = scripted_harness().run_corpus(&corpus).await;

        let inputs: Vec<&str> = report.cases().iter().map(|c| c.input.as_str()).collect();
        assert_eq!(inputs, vec!["a", "bb", "ccc", "dddd"]);
        let statuses: Vec<CaseStatus> = report.cases().iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                CaseStatus::Passed,
                CaseStatus::Passed,
                CaseStatus::Passed,
                CaseStatus::Failed
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_case() {
        let corpus = parse_corpus(
            "panic|||x\n---\nerror|||x\n---\nhang|||x\n---\nmissing|||\n---\nok|||ok",
        );
        let report = scripted_harness().run_corpus(&corpus).await;

        assert_eq!(report.len(), corpus.len());
        let cases = report.cases();

        assert_eq!(cases[0].status, CaseStatus::Failed);
        assert_eq!(cases[0].error.as_deref(), Some("runner exploded"));

        assert_eq!(cases[1].status, CaseStatus::Failed);
        assert_eq!(cases[1].error.as_deref(), Some("pipe closed unexpectedly"));
        assert_eq!(cases[1].runtime_ms, 0);

        assert_eq!(cases[2].status, CaseStatus::Failed);
        assert_eq!(cases[2].runtime_ms, 5000);

        assert_eq!(cases[3].status, CaseStatus::Failed);
        assert_eq!(cases[4].status, CaseStatus::Passed);
        assert_eq!(report.summary().passed, 1);
    }

    #[tokio::test]
    async fn test_empty_corpus_yields_empty_report() {
        let report = scripted_harness().run_corpus(&parse_corpus("")).await;
        assert!(report.is_empty());
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        fn harness_for(script_body: &str, config: &HarnessConfig) -> (tempfile::TempDir, Harness) {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("main.sh");
            std::fs::write(&script, script_body).unwrap();
            let command = CommandSpec::for_target(&["sh".to_string()], &script);
            let harness = Harness::new(Arc::new(ProcessRunner::new()), command, config);
            (dir, harness)
        }

        #[tokio::test]
        async fn test_doubling_target() {
            let (_dir, harness) =
                harness_for("read n\necho $((n * 2))\n", &HarnessConfig::default());
            let corpus = parse_corpus("3|||6\n---\n10|||20\n---\n4|||9");

            let report = harness.run_corpus(&corpus).await;
            let cases = report.cases();

            assert_eq!(cases[0].status, CaseStatus::Passed);
            assert_eq!(cases[0].actual, "6");
            assert_eq!(cases[1].status, CaseStatus::Passed);
            assert_eq!(cases[2].status, CaseStatus::Failed);
            assert_eq!(cases[2].actual, "8");
        }

        #[tokio::test]
        async fn test_crashing_case_does_not_stop_run() {
            let script = r#"read n
if [ "$n" = "0" ]; then
  echo "division by zero" >&2
  exit 1
fi
echo $((12 / n))
"#;
            let (_dir, harness) = harness_for(script, &HarnessConfig::default());
            let corpus = parse_corpus("0|||0\n---\n4|||3");

            let report = harness.run_corpus(&corpus).await;
            let cases = report.cases();

            assert_eq!(cases[0].status, CaseStatus::Failed);
            assert_eq!(cases[0].error.as_deref(), Some("division by zero"));
            assert_eq!(cases[1].status, CaseStatus::Passed);
            assert_eq!(cases[1].error, None);
        }

        #[tokio::test]
        async fn test_timeout_enforced() {
            let config = HarnessConfig::default().with_timeout_ms(500);
            let (_dir, harness) = harness_for("sleep 10\necho late\n", &config);
            let corpus = parse_corpus("1|||late\n---\n2|||late");

            let started = std::time::Instant::now();
            let report = harness.run_corpus(&corpus).await;
            assert!(started.elapsed() < Duration::from_secs(5));

            for case in report.cases() {
                assert_eq!(case.status, CaseStatus::Failed);
                assert_eq!(case.runtime_ms, 500);
                assert!(case.error.as_deref().unwrap().contains("timed out"));
            }
        }
    }
}
