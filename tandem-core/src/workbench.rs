//! State owned by the interactive context, and the UI-facing contracts.
//!
//! The UI layer (tabs, dialogs, charts) is external. It plugs in through two
//! traits: [`Surface`] receives everything the core wants to show, and
//! [`EditorSource`] exposes the open editors' live content.

use std::collections::HashMap;
use std::path::Path;

use crate::state::{ProjectState, VariantSelections};
use crate::types::{EditorSnapshot, Pid, ProcessUsage, StatusAlignment};

/// Outgoing UI notifications. Always invoked on the interactive context.
pub trait Surface: Send {
    fn set_status(&mut self, text: &str, alignment: StatusAlignment);

    fn set_build_in_progress(&mut self, in_progress: bool);

    /// Show the "sync needed" prompt with accept / dismiss actions.
    fn show_sync_needed(&mut self);

    fn dismiss_sync_needed(&mut self);

    /// Blocking error (service unavailable, initialization or setup failure).
    fn show_error(&mut self, message: &str);

    /// A file was written by auto-save.
    fn file_saved(&mut self, file_name: &str);

    /// The memory chart was rebuilt; `datasets[i]` is the process drawn by dataset `i`.
    fn memory_chart_reset(&mut self, datasets: &[(Pid, String)]) {
        let _ = datasets;
    }
}

/// Read access to the open editors. Always invoked on the interactive context.
pub trait EditorSource: Send {
    /// Every open editor, in tab order.
    fn open_editors(&self) -> Vec<EditorSnapshot>;

    /// The open editor showing `path`, matched by absolute path.
    fn editor_for(&self, path: &Path) -> Option<EditorSnapshot> {
        self.open_editors().into_iter().find(|e| e.path == path)
    }
}

/// Everything the interactive context owns.
pub struct Workbench {
    pub project: ProjectState,
    pub variants: VariantSelections,
    pub surface: Box<dyn Surface>,
    pub editors: Box<dyn EditorSource>,
    /// Set once the host starts tearing down.
    pub destroying: bool,
    status: String,
    pid_datasets: HashMap<Pid, usize>,
}

impl Workbench {
    pub fn new(
        project: ProjectState,
        surface: Box<dyn Surface>,
        editors: Box<dyn EditorSource>,
    ) -> Self {
        Self {
            project,
            variants: VariantSelections::default(),
            surface,
            editors,
            destroying: false,
            status: String::new(),
            pid_datasets: HashMap::new(),
        }
    }

    pub fn set_status(&mut self, text: &str, alignment: StatusAlignment) {
        self.status.clear();
        self.status.push_str(text);
        self.surface.set_status(text, alignment);
    }

    /// Text last put on the status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Rebuild the pid → dataset index map from the monitor's current view.
    pub fn reset_memory_chart(&mut self, usages: &[ProcessUsage]) {
        self.pid_datasets.clear();
        let mut datasets = Vec::with_capacity(usages.len());
        for (index, usage) in usages.iter().enumerate() {
            self.pid_datasets.insert(usage.pid, index);
            datasets.push((usage.pid, usage.label.clone()));
        }
        self.surface.memory_chart_reset(&datasets);
    }

    pub fn dataset_index(&self, pid: Pid) -> Option<usize> {
        self.pid_datasets.get(&pid).copied()
    }

    /// Show the sync prompt unless it is already up. Returns whether it was shown.
    pub fn show_sync_needed(&mut self) -> bool {
        if self.project.sync_prompt_visible {
            return false;
        }
        self.project.sync_prompt_visible = true;
        self.surface.show_sync_needed();
        true
    }

    pub fn dismiss_sync_needed(&mut self) {
        if self.project.sync_prompt_visible {
            self.project.sync_prompt_visible = false;
            self.surface.dismiss_sync_needed();
        }
    }

    pub fn set_build_in_progress(&mut self, in_progress: bool) {
        self.project.build_in_progress = in_progress;
        self.surface.set_build_in_progress(in_progress);
    }
}

impl std::fmt::Debug for Workbench {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbench")
            .field("project", &self.project)
            .field("variants", &self.variants)
            .field("destroying", &self.destroying)
            .field("status", &self.status)
            .field("pid_datasets", &self.pid_datasets)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Calls(Arc<Mutex<Vec<String>>>);

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

    struct NoEditors;

    impl EditorSource for NoEditors {
        fn open_editors(&self) -> Vec<EditorSnapshot> {
            Vec::new()
        }
    }

    fn workbench(calls: &Calls) -> Workbench {
        Workbench::new(
            ProjectState::new("/p"),
            Box::new(calls.clone()),
            Box::new(NoEditors),
        )
    }

    #[test]
    fn sync_prompt_is_single_flight() {
        let calls = Calls::default();
        let mut wb = workbench(&calls);
        assert!(wb.show_sync_needed());
        assert!(!wb.show_sync_needed(), "second prompt while visible is suppressed");
        wb.dismiss_sync_needed();
        wb.dismiss_sync_needed();
        assert_eq!(
            *calls.0.lock().unwrap(),
            vec!["sync:show".to_string(), "sync:dismiss".to_string()]
        );
    }

    #[test]
    fn memory_chart_indexes_follow_usage_order() {
        let calls = Calls::default();
        let mut wb = workbench(&calls);
        wb.reset_memory_chart(&[
            ProcessUsage {
                pid: Pid(10),
                label: "ide".into(),
                usage_history: vec![],
            },
            ProcessUsage {
                pid: Pid(20),
                label: "tooling".into(),
                usage_history: vec![1, 2],
            },
        ]);
        assert_eq!(wb.dataset_index(Pid(10)), Some(0));
        assert_eq!(wb.dataset_index(Pid(20)), Some(1));

        wb.reset_memory_chart(&[]);
        assert_eq!(wb.dataset_index(Pid(20)), None, "reset drops stale pids");
    }

    #[test]
    fn status_line_remembers_last_text() {
        let calls = Calls::default();
        let mut wb = workbench(&calls);
        assert_eq!(wb.status(), "");
        wb.set_status("Auto-saved: a.rs", StatusAlignment::Start);
        wb.set_status("Project initialized", StatusAlignment::Center);
        assert_eq!(wb.status(), "Project initialized");
    }
}
