//! YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.tandem/
//!   config.yaml   (optional, defaults apply when missing)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// Auto-save engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub enabled: bool,
    /// Period of the dirty scan.
    pub interval_ms: u64,
    /// Pause between the scan and the flush.
    pub settle_ms: u64,
    /// How long the "Auto-saved" indicator stays up.
    pub indicator_ms: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 2000,
            settle_ms: 100,
            indicator_ms: 1500,
        }
    }
}

impl AutoSaveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn indicator(&self) -> Duration {
        Duration::from_millis(self.indicator_ms)
    }
}

/// Tooling daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolingConfig {
    /// Socket of the tooling daemon. `None` means `~/.tandem/tooling.sock`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,
    /// Upper bound for the session metadata fetch after a server start.
    pub metadata_timeout_ms: u64,
    /// Label the tooling process is monitored under.
    pub process_label: String,
    /// Period of the memory sampler.
    pub sample_interval_ms: u64,
}

impl Default for ToolingConfig {
    fn default() -> Self {
        Self {
            socket: None,
            metadata_timeout_ms: 10_000,
            process_label: "tooling-server".to_string(),
            sample_interval_ms: 1000,
        }
    }
}

impl ToolingConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemConfig {
    pub autosave: AutoSaveConfig,
    pub tooling: ToolingConfig,
}

/// `<home>/.tandem/`: pure, no I/O.
pub fn tandem_root(home: &Path) -> PathBuf {
    home.join(".tandem")
}

/// `<home>/.tandem/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    tandem_root(home).join("config.yaml")
}

impl TandemConfig {
    /// Load `<home>/.tandem/config.yaml`; defaults when the file is absent.
    ///
    /// Returns `ConfigError::Parse` (with path + line context) if malformed YAML.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = config_path_at(home);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&home()?)
    }

    /// Save atomically: write `config.yaml.tmp`, then rename.
    pub fn save_at(&self, home: &Path) -> Result<(), ConfigError> {
        let path = config_path_at(home);
        let dir = tandem_root(home);
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let yaml = serde_yaml::to_string(self)?;
        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    /// Socket of the tooling daemon, resolved against `home`.
    pub fn tooling_socket_at(&self, home: &Path) -> PathBuf {
        self.tooling
            .socket
            .clone()
            .unwrap_or_else(|| tandem_root(home).join("tooling.sock"))
    }
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_file_missing() {
        let home = TempDir::new().unwrap();
        let config = TandemConfig::load_at(home.path()).unwrap();
        assert_eq!(config, TandemConfig::default());
        assert_eq!(config.autosave.interval(), Duration::from_secs(2));
        assert_eq!(config.autosave.settle(), Duration::from_millis(100));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(tandem_root(home.path())).unwrap();
        std::fs::write(
            config_path_at(home.path()),
            "autosave:\n  enabled: false\n",
        )
        .unwrap();

        let config = TandemConfig::load_at(home.path()).unwrap();
        assert!(!config.autosave.enabled);
        assert_eq!(config.autosave.interval_ms, 2000);
        assert_eq!(config.tooling, ToolingConfig::default());
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let home = TempDir::new().unwrap();
        TandemConfig::default().save_at(home.path()).unwrap();
        let tmp = config_path_at(home.path()).with_extension("yaml.tmp");
        assert!(!tmp.exists(), "tmp file should be removed after atomic rename");
        assert!(config_path_at(home.path()).exists());
    }

    #[test]
    fn default_socket_lives_under_tandem_root() {
        let home = Path::new("/home/dev");
        let socket = TandemConfig::default().tooling_socket_at(home);
        assert_eq!(socket, PathBuf::from("/home/dev/.tandem/tooling.sock"));
    }
}
