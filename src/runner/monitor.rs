//! Resident memory monitor
//!
//! Samples a running child's resident set size at a fixed interval and keeps
//! the peak. The peak is the sampler task's return value, so it is only ever
//! read after the task has been joined.
//!
//! Memory is a best-effort metric: any failure to sample yields 0.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Handle to a running sampler
pub struct MemoryMonitor {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<u64>>,
}

impl MemoryMonitor {
    /// Start sampling `pid` every `interval`. The first sample is taken before
    /// returning so short-lived processes still record a peak. A missing pid
    /// yields a monitor that reports 0.
    pub async fn start(pid: Option<u32>, interval: Duration) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let handle = match pid {
            Some(pid) => {
                let initial = read_rss_kb(pid).await.unwrap_or(0);
                Some(tokio::spawn(sample_loop(pid, interval, stop_rx, initial)))
            }
            None => None,
        };
        Self { stop, handle }
    }

    /// Tell the sampler to stop without joining it. Must be called as soon as
    /// the process has been reaped.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Signal the sampler to stop and join it, waiting at most `grace`.
    /// Returns the peak resident memory in KB.
    pub async fn finish(mut self, grace: Duration) -> u64 {
        self.stop();

        let Some(mut handle) = self.handle.take() else {
            return 0;
        };

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(peak)) => peak,
            Ok(Err(e)) => {
                warn!("Memory monitor task failed: {}", e);
                0
            }
            Err(_) => {
                warn!(
                    "Memory monitor did not stop within {}ms, aborting",
                    grace.as_millis()
                );
                handle.abort();
                0
            }
        }
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn sample_loop(
    pid: u32,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
    initial: u64,
) -> u64 {
    let mut peak = initial;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                if *stop.borrow() {
                    break;
                }
                match read_rss_kb(pid).await {
                    Some(kb) => peak = peak.max(kb),
                    None => {
                        debug!("Process {} no longer observable, sampler exiting", pid);
                        break;
                    }
                }
            }
        }
    }

    peak
}

/// Current resident set size of `pid` in KB, or None if the process is gone
/// (exited, zombie) or cannot be inspected.
#[cfg(target_os = "linux")]
pub async fn read_rss_kb(pid: u32) -> Option<u64> {
    let status = tokio::fs::read_to_string(format!("/proc/{}/status", pid))
        .await
        .ok()?;
    parse_vm_rss(&status)
}

#[cfg(not(target_os = "linux"))]
pub async fn read_rss_kb(_pid: u32) -> Option<u64> {
    None
}

/// Extract `VmRSS` (KB) from the contents of `/proc/<pid>/status`.
/// Zombies carry no `VmRSS` line and yield None.
pub fn parse_vm_rss(status: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let value = line.strip_prefix("VmRSS:")?;
        value.split_whitespace().next()?.parse::<u64>().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tpython3\nState:\tS (sleeping)\nVmPeak:\t   20480 kB\nVmRSS:\t    9216 kB\nThreads:\t1\n";
        assert_eq!(parse_vm_rss(status), Some(9216));
    }

    #[test]
    fn test_parse_vm_rss_zombie() {
        let status = "Name:\tsh\nState:\tZ (zombie)\nThreads:\t1\n";
        assert_eq!(parse_vm_rss(status), None);
    }

    #[tokio::test]
    async fn test_missing_pid_reports_zero() {
        let monitor = MemoryMonitor::start(None, Duration::from_millis(10)).await;
        assert_eq!(monitor.finish(Duration::from_millis(100)).await, 0);
    }

    #[tokio::test]
    async fn test_nonexistent_process_reports_zero() {
        // pid_max never reaches u32::MAX
        let monitor = MemoryMonitor::start(Some(u32::MAX), Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(monitor.finish(Duration::from_millis(100)).await, 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_samples_live_process() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("2")
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let monitor = MemoryMonitor::start(child.id(), Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let started = std::time::Instant::now();
        let peak = monitor.finish(Duration::from_millis(500)).await;
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(peak > 0);

        child.kill().await.unwrap();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_initial_sample_recorded_before_first_tick() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("2")
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        // An interval far longer than the run leaves only the initial sample
        let monitor = MemoryMonitor::start(child.id(), Duration::from_secs(60)).await;
        let peak = monitor.finish(Duration::from_millis(500)).await;
        assert!(peak > 0);

        child.kill().await.unwrap();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_stop_ends_sampler_while_process_lives() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("2")
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let monitor = MemoryMonitor::start(child.id(), Duration::from_millis(20)).await;
        monitor.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let finished = monitor
            .handle
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(false);
        assert!(finished);
        assert!(monitor.finish(Duration::from_millis(100)).await > 0);

        child.kill().await.unwrap();
    }
}
