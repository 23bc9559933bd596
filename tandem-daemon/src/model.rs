//! Workspace / project model collaborator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use tandem_core::{InitResult, WorkspaceModel};

/// Workspace construction failed after a successful initialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SetupError(pub String);

/// Builds the workspace from an initialization result. Blocking; the
/// orchestrator calls it on the blocking pool.
pub trait ProjectModel: Send + Sync {
    fn setup_project(&self, result: &InitResult) -> Result<(), SetupError>;

    fn workspace(&self) -> Option<WorkspaceModel>;

    fn notify_project_update(&self);
}

/// Keeps the workspace the service reported.
#[derive(Debug, Default)]
pub struct InMemoryProjectModel {
    workspace: Mutex<Option<WorkspaceModel>>,
    updates: AtomicUsize,
}

impl InMemoryProjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl ProjectModel for InMemoryProjectModel {
    fn setup_project(&self, result: &InitResult) -> Result<(), SetupError> {
        *self.workspace.lock().unwrap_or_else(PoisonError::into_inner) = result.workspace.clone();
        Ok(())
    }

    fn workspace(&self) -> Option<WorkspaceModel> {
        self.workspace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn notify_project_update(&self) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

/// User-facing description of a setup failure.
pub fn describe_setup_error(err: &SetupError) -> String {
    let message = err.0.trim();
    let lower = message.to_lowercase();
    if lower.contains("workspace") {
        format!("Failed to configure workspace: {message}")
    } else if lower.contains("build") {
        format!("Failed to build project model: {message}")
    } else if message.is_empty() {
        "Project setup failed: Unknown error occurred".to_string()
    } else {
        format!("Project setup failed: {message}")
    }
}

pub const NULL_WORKSPACE_MESSAGE: &str =
    "Workspace initialization failed. The project structure could not be analyzed.";
