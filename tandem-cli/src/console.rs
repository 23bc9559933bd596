//! Terminal rendition of the UI surface.
//!
//! Everything goes to stderr so `--json` output on stdout stays parseable.

use colored::Colorize;

use tandem_core::{EditorSnapshot, EditorSource, StatusAlignment, Surface};

#[derive(Debug, Default)]
pub struct Console {
    quiet: bool,
}

impl Console {
    /// A quiet console only reports errors.
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Surface for Console {
    fn set_status(&mut self, text: &str, _alignment: StatusAlignment) {
        if !self.quiet && !text.is_empty() {
            eprintln!("{} {text}", "::".bright_black());
        }
    }

    fn set_build_in_progress(&mut self, in_progress: bool) {
        if !self.quiet && in_progress {
            eprintln!("{} build running", "::".bright_black());
        }
    }

    fn show_sync_needed(&mut self) {
        if !self.quiet {
            eprintln!("{} project files changed, run `tandem init` again", "!".yellow().bold());
        }
    }

    fn dismiss_sync_needed(&mut self) {}

    fn show_error(&mut self, message: &str) {
        eprintln!("{} {message}", "error:".red().bold());
    }

    fn file_saved(&mut self, file_name: &str) {
        if !self.quiet {
            eprintln!("{} saved {file_name}", "::".bright_black());
        }
    }
}

/// The CLI has no editors; auto-save always finds nothing to write.
pub struct NoEditors;

impl EditorSource for NoEditors {
    fn open_editors(&self) -> Vec<EditorSnapshot> {
        Vec::new()
    }
}
