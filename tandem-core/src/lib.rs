//! Tandem core library: domain types, project state, the interactive
//! context, configuration and errors.
//!
//! Public API surface:
//! - [`types`]: newtypes, init request/result, document events
//! - [`state`]: [`ProjectState`] and build variant selections
//! - [`context`]: [`InteractiveContext`], the single writer of project state
//! - [`workbench`]: [`Workbench`] plus the UI-facing [`Surface`] / [`EditorSource`] contracts
//! - [`config`]: YAML configuration load / save
//! - [`error`]: [`ConfigError`], [`ContextError`]

pub mod config;
pub mod context;
pub mod error;
pub mod state;
pub mod types;
pub mod workbench;

pub use config::{AutoSaveConfig, TandemConfig, ToolingConfig};
pub use context::InteractiveContext;
pub use error::{ConfigError, ContextError};
pub use state::{ProjectState, VariantSelections};
pub use types::{
    DistributionParams, DocumentEvent, DocumentEventKind, EditorId, EditorRef,
    EditorSnapshot, FailureKind, InitFailure, InitOutcome, InitRequest, InitResult, ModuleInfo,
    Pid, ProcessUsage, StatusAlignment, WorkspaceModel,
};
pub use workbench::{EditorSource, Surface, Workbench};
