//! Domain types shared by the orchestrator, the dispatcher and auto-save.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Everything that crosses the tooling daemon socket is serde-serializable.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An OS process id as reported by the tooling service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        Self(pid)
    }
}

/// Identity of one open editor (one tab). Stable for the editor's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditorId(pub u64);

impl fmt::Display for EditorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "editor#{}", self.0)
    }
}

impl From<u64> for EditorId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Initialization request / result
// ---------------------------------------------------------------------------

/// Which build-tool distribution the tooling server should use.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DistributionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
    #[serde(default)]
    pub offline: bool,
}

/// One project initialization request. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    /// Absolute path to the project root.
    pub project_dir: PathBuf,
    #[serde(default)]
    pub distribution: DistributionParams,
    /// Module path → selected variant. Empty means "service defaults".
    #[serde(default)]
    pub variant_selections: BTreeMap<String, String>,
}

impl InitRequest {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            distribution: DistributionParams::default(),
            variant_selections: BTreeMap::new(),
        }
    }

    pub fn with_distribution(mut self, distribution: DistributionParams) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_variants(mut self, variants: BTreeMap<String, String>) -> Self {
        self.variant_selections = variants;
        self
    }
}

/// Why an initialization failed. Data, not an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    DirInaccessible,
    NotADir,
    NotFound,
    Unknown,
}

impl FailureKind {
    /// User-facing reason. Every kind has its own message.
    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::DirInaccessible => "the project directory is not accessible",
            FailureKind::NotADir => "the selected file is not a directory",
            FailureKind::NotFound => "the project directory does not exist",
            FailureKind::Unknown => "an unknown error occurred",
        }
    }

    /// Validate a project directory before anything is sent to the service.
    ///
    /// Returns `None` when the directory exists and can be listed.
    pub fn classify_dir(path: &Path) -> Option<FailureKind> {
        match std::fs::metadata(path) {
            Err(err) if err.kind() == ErrorKind::NotFound => Some(FailureKind::NotFound),
            Err(_) => Some(FailureKind::DirInaccessible),
            Ok(meta) if !meta.is_dir() => Some(FailureKind::NotADir),
            Ok(_) => match std::fs::read_dir(path) {
                Ok(_) => None,
                Err(_) => Some(FailureKind::DirInaccessible),
            },
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// One module of the analyzed project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module path, e.g. `:app`.
    pub path: String,
    #[serde(default)]
    pub variants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
}

/// In-memory representation of an analyzed project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceModel {
    pub root: PathBuf,
    #[serde(default)]
    pub modules: Vec<ModuleInfo>,
}

impl WorkspaceModel {
    /// Module path → selected variant, for modules that have a selection.
    pub fn variant_selections(&self) -> BTreeMap<String, String> {
        self.modules
            .iter()
            .filter_map(|m| m.selected.clone().map(|v| (m.path.clone(), v)))
            .collect()
    }
}

/// Result of one initialization as reported by the tooling service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResult {
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceModel>,
}

impl InitResult {
    pub fn success(workspace: Option<WorkspaceModel>) -> Self {
        Self {
            successful: true,
            failure: None,
            workspace,
        }
    }

    pub fn failure(kind: FailureKind) -> Self {
        Self {
            successful: false,
            failure: Some(kind),
            workspace: None,
        }
    }

    /// Failure kind for UI messaging; `Unknown` when unclassified.
    pub fn failure_kind(&self) -> FailureKind {
        self.failure.unwrap_or(FailureKind::Unknown)
    }
}

/// A typed initialization failure, resolved before it reaches the UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitFailure {
    /// Bind or tooling server start failed. No retry automation.
    #[error("tooling server is unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service ran the initialization and it failed.
    #[error("project initialization failed: {}", .0.message())]
    Initialization(FailureKind),

    /// Initialization succeeded but the workspace could not be built.
    #[error("{0}")]
    WorkspaceSetup(String),
}

impl InitFailure {
    /// Failure kind when this is an initialization failure.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            InitFailure::Initialization(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Final outcome of an initialization handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Success(InitResult),
    Failure(InitFailure),
    /// Not an error. Never logged as one.
    Cancelled,
}

impl InitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InitOutcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, InitOutcome::Cancelled)
    }

    pub fn result(&self) -> Option<&InitResult> {
        match self {
            InitOutcome::Success(result) => Some(result),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&InitFailure> {
        match self {
            InitOutcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Documents and editors
// ---------------------------------------------------------------------------

/// Payload-free discriminant of [`DocumentEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentEventKind {
    Open,
    Change,
    Save,
    Close,
    Selected,
}

/// A document lifecycle event. Content is re-read lazily downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    Open { path: PathBuf },
    Change { path: PathBuf },
    Save { path: PathBuf },
    Close { path: PathBuf },
    Selected { path: PathBuf },
}

impl DocumentEvent {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        DocumentEvent::Open { path: path.into() }
    }

    pub fn change(path: impl Into<PathBuf>) -> Self {
        DocumentEvent::Change { path: path.into() }
    }

    pub fn save(path: impl Into<PathBuf>) -> Self {
        DocumentEvent::Save { path: path.into() }
    }

    pub fn close(path: impl Into<PathBuf>) -> Self {
        DocumentEvent::Close { path: path.into() }
    }

    pub fn selected(path: impl Into<PathBuf>) -> Self {
        DocumentEvent::Selected { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        match self {
            DocumentEvent::Open { path }
            | DocumentEvent::Change { path }
            | DocumentEvent::Save { path }
            | DocumentEvent::Close { path }
            | DocumentEvent::Selected { path } => path,
        }
    }

    pub fn kind(&self) -> DocumentEventKind {
        match self {
            DocumentEvent::Open { .. } => DocumentEventKind::Open,
            DocumentEvent::Change { .. } => DocumentEventKind::Change,
            DocumentEvent::Save { .. } => DocumentEventKind::Save,
            DocumentEvent::Close { .. } => DocumentEventKind::Close,
            DocumentEvent::Selected { .. } => DocumentEventKind::Selected,
        }
    }
}

/// Liveness handle for the editor that owns a dispatcher.
///
/// The host keeps the `Arc`; consumers hold a `Weak` and must treat a failed
/// upgrade the same as [`EditorRef::is_released`].
#[derive(Debug)]
pub struct EditorRef {
    id: EditorId,
    released: AtomicBool,
}

impl EditorRef {
    pub fn new(id: EditorId) -> Self {
        Self {
            id,
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> EditorId {
        self.id
    }

    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// Live state of one open editor, captured on the interactive context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSnapshot {
    pub id: EditorId,
    /// Absolute path of the file shown in the editor.
    pub path: PathBuf,
    pub content: String,
    pub writable: bool,
}

/// Horizontal alignment of the status line text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusAlignment {
    Start,
    #[default]
    Center,
}

/// Memory samples of one watched process, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessUsage {
    pub pid: Pid,
    pub label: String,
    pub usage_history: Vec<u64>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
