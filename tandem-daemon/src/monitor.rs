//! Process memory monitor.
//!
//! [`ProcfsMonitor`] samples `VmRSS` from `/proc/<pid>/status`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tandem_core::{Pid, ProcessUsage};

/// Samples kept per process.
pub const HISTORY_LEN: usize = 30;

pub trait ProcessMonitor: Send + Sync {
    /// Watch `pid` under `label`. A label already watched moves to the new pid.
    fn watch_process(&self, pid: Pid, label: &str);

    fn memory_usages(&self) -> Vec<ProcessUsage>;

    /// Take one sample of every watched process.
    fn sample(&self) {}
}

/// Sample `monitor` every `interval` until cancelled.
pub async fn run_sampler(
    monitor: Arc<dyn ProcessMonitor>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => monitor.sample(),
        }
    }
    tracing::debug!("memory sampler stopped");
}

#[derive(Debug)]
struct Watched {
    pid: Pid,
    label: String,
    history: VecDeque<u64>,
}

#[derive(Debug)]
pub struct ProcfsMonitor {
    proc_root: PathBuf,
    watched: Mutex<Vec<Watched>>,
}

impl Default for ProcfsMonitor {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

impl ProcfsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            watched: Mutex::new(Vec::new()),
        }
    }

    fn watched(&self) -> MutexGuard<'_, Vec<Watched>> {
        self.watched.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProcessMonitor for ProcfsMonitor {
    fn watch_process(&self, pid: Pid, label: &str) {
        let mut watched = self.watched();
        match watched.iter_mut().find(|w| w.label == label) {
            Some(entry) => {
                tracing::info!(label, from = %entry.pid, to = %pid, "re-attaching memory watcher");
                entry.pid = pid;
                entry.history.clear();
            }
            None => {
                tracing::info!(label, %pid, "watching process memory");
                watched.push(Watched {
                    pid,
                    label: label.to_string(),
                    history: VecDeque::with_capacity(HISTORY_LEN),
                });
            }
        }
    }

    fn memory_usages(&self) -> Vec<ProcessUsage> {
        self.watched()
            .iter()
            .map(|w| ProcessUsage {
                pid: w.pid,
                label: w.label.clone(),
                usage_history: w.history.iter().copied().collect(),
            })
            .collect()
    }

    /// Vanished processes record 0.
    fn sample(&self) {
        for entry in self.watched().iter_mut() {
            let rss = read_rss_bytes(&self.proc_root, entry.pid).unwrap_or(0);
            if entry.history.len() == HISTORY_LEN {
                entry.history.pop_front();
            }
            entry.history.push_back(rss);
        }
    }
}

/// Resident set size of `pid` in bytes.
pub fn read_rss_bytes(proc_root: &Path, pid: Pid) -> Option<u64> {
    let status = std::fs::read_to_string(proc_root.join(pid.0.to_string()).join("status")).ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}
