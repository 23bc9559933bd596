//! Fixtures shared by the daemon integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tandem_core::{
    EditorSnapshot, EditorSource, Pid, ProcessUsage, ProjectState, StatusAlignment, Surface,
    Workbench,
};
use tandem_daemon::ProcessMonitor;

#[derive(Clone, Default)]
pub struct Calls(pub Arc<Mutex<Vec<String>>>);

impl Calls {
    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

impl Surface for Calls {
    fn set_status(&mut self, text: &str, _alignment: StatusAlignment) {
        self.0.lock().unwrap().push(format!("status:{text}"));
    }
    fn set_build_in_progress(&mut self, in_progress: bool) {
        self.0.lock().unwrap().push(format!("build:{in_progress}"));
    }
    fn show_sync_needed(&mut self) {
        self.0.lock().unwrap().push("sync:show".into());
    }
    fn dismiss_sync_needed(&mut self) {
        self.0.lock().unwrap().push("sync:dismiss".into());
    }
    fn show_error(&mut self, message: &str) {
        self.0.lock().unwrap().push(format!("error:{message}"));
    }
    fn file_saved(&mut self, file_name: &str) {
        self.0.lock().unwrap().push(format!("saved:{file_name}"));
    }
}

pub struct NoEditors;

impl EditorSource for NoEditors {
    fn open_editors(&self) -> Vec<EditorSnapshot> {
        Vec::new()
    }
}

pub fn workbench(project_dir: &Path, calls: &Calls) -> Workbench {
    Workbench::new(
        ProjectState::new(project_dir),
        Box::new(calls.clone()),
        Box::new(NoEditors),
    )
}

/// Remembers every `watch_process` call and counts samples.
#[derive(Default)]
pub struct RecordingMonitor {
    pub watched: Mutex<Vec<(Pid, String)>>,
    pub samples: AtomicUsize,
}

impl RecordingMonitor {
    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.watched.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }
}

impl ProcessMonitor for RecordingMonitor {
    fn watch_process(&self, pid: Pid, label: &str) {
        self.watched.lock().unwrap().push((pid, label.to_string()));
    }

    fn memory_usages(&self) -> Vec<ProcessUsage> {
        self.watched
            .lock()
            .unwrap()
            .last()
            .map(|(pid, label)| ProcessUsage {
                pid: *pid,
                label: label.clone(),
                usage_history: Vec::new(),
            })
            .into_iter()
            .collect()
    }

    fn sample(&self) {
        self.samples.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
