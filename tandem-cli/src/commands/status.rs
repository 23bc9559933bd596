//! `tandem status`: tooling daemon status.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use tandem_daemon::{block_on, request_status, DaemonError, ServiceStatus};

use super::load_config;

/// Arguments for `tandem status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Tooling daemon socket. Defaults to the configured socket.
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson {
    running: bool,
    socket: String,
    #[serde(flatten)]
    status: Option<ServiceStatus>,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let (_, socket) = load_config(self.socket)?;

        let status = match block_on(request_status(&socket))? {
            Ok(status) => Some(status),
            Err(DaemonError::DaemonNotRunning { .. }) => None,
            Err(err) => return Err(err).context("failed to query tooling daemon status"),
        };

        if self.json {
            let payload = StatusJson {
                running: status.is_some(),
                socket: socket.display().to_string(),
                status,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
            );
            return Ok(());
        }

        let Some(status) = status else {
            println!(
                "{} tooling daemon is not running ({})",
                "■".bright_black().bold(),
                socket.display()
            );
            return Ok(());
        };
        println!(
            "{} tooling daemon running ({})",
            "■".green().bold(),
            socket.display()
        );
        let server = match status.pid {
            Some(pid) if status.tooling_started => format!("started, pid {pid}"),
            _ if status.tooling_started => "started".to_string(),
            _ => "stopped".to_string(),
        };
        println!("  tooling server: {server}");
        println!(
            "  build: {}",
            if status.build_in_progress {
                "in progress".yellow().to_string()
            } else {
                "idle".to_string()
            }
        );
        Ok(())
    }
}
