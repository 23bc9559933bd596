//! Project manager state.
//!
//! One [`ProjectState`] exists per host process. It is owned by the
//! [`crate::Workbench`] and therefore only ever mutated from the interactive
//! context; nothing in here is synchronized on purpose.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::{InitResult, WorkspaceModel};

/// Process-wide project manager state.
#[derive(Debug, Clone, Default)]
pub struct ProjectState {
    pub project_dir: Option<PathBuf>,
    /// Resumption point across a host recreation.
    pub cached_init_result: Option<InitResult>,
    pub initialized: bool,
    pub initializing: bool,
    pub build_in_progress: bool,
    pub workspace: Option<WorkspaceModel>,
    pub sync_prompt_visible: bool,
}

impl ProjectState {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: Some(project_dir.into()),
            ..Self::default()
        }
    }

    /// The cached result, if it can be reused without re-initializing.
    pub fn resumable_result(&self) -> Option<&InitResult> {
        if !self.initialized {
            return None;
        }
        self.cached_init_result.as_ref().filter(|r| r.successful)
    }

    /// Clear the transient flags. Called when the host is torn down so a
    /// quick close/reopen is never blocked by a stale `initializing` flag.
    pub fn reset(&mut self) {
        self.initializing = false;
        self.build_in_progress = false;
        self.sync_prompt_visible = false;
    }
}

/// Build variant selections known to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantSelections {
    /// Selections reported by the last successful initialization.
    pub current: Option<BTreeMap<String, String>>,
    /// Selections changed by the user and not yet synced.
    pub updated: BTreeMap<String, String>,
}

impl VariantSelections {
    /// Variant map for the next initialization request.
    ///
    /// - nothing known → empty (service defaults)
    /// - pending updates → current overlaid with updates
    /// - otherwise → current selections
    pub fn effective(&self) -> BTreeMap<String, String> {
        let Some(current) = self.current.as_ref() else {
            return BTreeMap::new();
        };
        let mut selections = current.clone();
        selections.extend(self.updated.iter().map(|(k, v)| (k.clone(), v.clone())));
        selections
    }

    /// Adopt the selections of a freshly initialized workspace.
    pub fn adopt(&mut self, selections: BTreeMap<String, String>) {
        self.current = Some(selections);
        self.updated.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn resumable_only_when_initialized_and_successful() {
        let mut state = ProjectState::new("/p");
        state.cached_init_result = Some(InitResult::success(None));
        assert!(state.resumable_result().is_none(), "not initialized yet");

        state.initialized = true;
        assert!(state.resumable_result().is_some());

        state.cached_init_result = Some(InitResult::failure(crate::FailureKind::NotFound));
        assert!(state.resumable_result().is_none(), "failed results never resume");
    }

    #[test]
    fn reset_clears_transient_flags_only() {
        let mut state = ProjectState::new("/p");
        state.initialized = true;
        state.initializing = true;
        state.build_in_progress = true;
        state.reset();
        assert!(state.initialized);
        assert!(!state.initializing);
        assert!(!state.build_in_progress);
    }

    #[test]
    fn effective_selections_without_information_are_empty() {
        let selections = VariantSelections::default();
        assert!(selections.effective().is_empty());
    }

    #[test]
    fn effective_selections_overlay_updates() {
        let mut selections = VariantSelections::default();
        selections.adopt(map(&[(":app", "debug"), (":lib", "debug")]));
        selections.updated = map(&[(":app", "release")]);
        assert_eq!(
            selections.effective(),
            map(&[(":app", "release"), (":lib", "debug")])
        );
    }

    #[test]
    fn adopt_resets_pending_updates() {
        let mut selections = VariantSelections::default();
        selections.updated = map(&[(":app", "release")]);
        selections.adopt(map(&[(":app", "release")]));
        assert!(selections.updated.is_empty());
    }
}
