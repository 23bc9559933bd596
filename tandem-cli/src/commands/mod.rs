pub mod init;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};

use tandem_core::TandemConfig;

/// Loaded config plus the daemon socket, `--socket` winning over config.
pub(crate) fn load_config(socket: Option<PathBuf>) -> Result<(TandemConfig, PathBuf)> {
    let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
    let config = TandemConfig::load_at(&home).context("failed to load tandem config")?;
    let socket = socket.unwrap_or_else(|| config.tooling_socket_at(&home));
    Ok((config, socket))
}
