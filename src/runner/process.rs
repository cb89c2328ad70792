//! Child process runner
//!
//! Spawns the target in its own process group, writes the test input to its
//! stdin, drains stdout and stderr separately, and bounds the whole exchange
//! with a wall-clock timeout. A memory monitor runs alongside for the lifetime
//! of the child.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::monitor::MemoryMonitor;
use super::{CommandSpec, ExecutionResult, RunLimits, Runner};

/// Runner that executes the target directly as a child process
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `cmd` once, feeding `input` plus a trailing newline as its complete stdin
    pub async fn execute(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        input: &str,
    ) -> Result<ExecutionResult> {
        debug!("Running target: {:?}", cmd.to_vec());

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = &cmd.work_dir {
            command.current_dir(dir);
        }

        let started_at = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch {}: {}", cmd.program, e);
                return Ok(ExecutionResult::launch_failed(format!(
                    "Failed to launch {}: {}",
                    cmd.program, e
                )));
            }
        };

        let pid = child.id();
        let monitor = MemoryMonitor::start(pid, limits.sample_interval).await;

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdin_data = format!("{}\n", input);

        let res = tokio::time::timeout(limits.timeout, async {
            tokio::try_join!(
                write_stdin(stdin_pipe, stdin_data.as_bytes()),
                read_pipe(stdout_pipe),
                read_pipe(stderr_pipe),
                async {
                    let status = child.wait().await;
                    // The pid is reaped from here on; nothing may keep observing it
                    monitor.stop();
                    // Background children holding the pipes open must not outlive the case
                    kill_process_group(pid);
                    status
                },
            )
        })
        .await;

        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        match res {
            Err(_) => {
                debug!(
                    "Target exceeded {}ms, killing process group",
                    limits.timeout.as_millis()
                );
                // `id()` is None once the target has been reaped
                kill_process_group(child.id());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out process: {}", e);
                }
                let _ = monitor.finish(limits.monitor_grace).await;
                Ok(ExecutionResult::timed_out(limits.timeout))
            }

            Ok(Err(e)) => {
                kill_process_group(child.id());
                let _ = child.kill().await;
                let _ = monitor.finish(limits.monitor_grace).await;
                Err(e).context("Failed to communicate with target process")
            }

            Ok(Ok((_, stdout, stderr, status))) => {
                let peak_memory_kb = monitor.finish(limits.monitor_grace).await;

                debug!(
                    "Target exited: code={:?}, time_ms={}, memory_kb={}",
                    status.code(),
                    elapsed_ms,
                    peak_memory_kb
                );

                Ok(ExecutionResult::completed(
                    String::from_utf8_lossy(&stdout),
                    String::from_utf8_lossy(&stderr),
                    status.code(),
                    elapsed_ms,
                    peak_memory_kb,
                ))
            }
        }
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: &str,
    ) -> Result<ExecutionResult> {
        self.execute(cmd, limits, stdin).await
    }
}

async fn write_stdin(pipe: Option<tokio::process::ChildStdin>, data: &[u8]) -> io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    match pipe.write_all(data).await {
        Ok(()) => {}
        // The target exited or closed stdin without reading all of it
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Err(e) => return Err(e),
    }
    // Dropping the pipe closes stdin so the target sees EOF
    drop(pipe);
    Ok(())
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => debug!("Failed to kill process group {}: {}", pid, e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
