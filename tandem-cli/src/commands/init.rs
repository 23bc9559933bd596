//! `tandem init`: open a project against the tooling daemon.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use tandem_core::{DistributionParams, InitOutcome, InitResult, ProjectState, Workbench};
use tandem_daemon::{
    block_on, InMemoryProjectModel, InitOptions, ProcfsMonitor, ProjectHost, SocketBinder,
};

use super::load_config;
use crate::console::{Console, NoEditors};

/// Arguments for `tandem init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project root directory.
    pub dir: PathBuf,

    /// Tooling daemon socket. Defaults to the configured socket.
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Build variant for a module, e.g. `:app=release`. Repeatable.
    #[arg(long = "variant", value_name = "MODULE=VARIANT", value_parser = parse_variant)]
    pub variants: Vec<(String, String)>,

    /// Ask the tooling server to resolve dependencies without network access.
    #[arg(long)]
    pub offline: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

fn parse_variant(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((module, variant)) if !module.is_empty() && !variant.is_empty() => {
            Ok((module.to_string(), variant.to_string()))
        }
        _ => Err(format!("expected MODULE=VARIANT, got '{raw}'")),
    }
}

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "module")]
    module: String,
    #[tabled(rename = "variant")]
    variant: String,
    #[tabled(rename = "available")]
    available: String,
}

#[derive(Serialize)]
struct InitJson<'a> {
    project_dir: String,
    result: &'a InitResult,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let (config, socket) = load_config(self.socket)?;
        // A path that does not resolve is passed through so it is classified
        // as a failure the same way the host would.
        let project_dir = std::fs::canonicalize(&self.dir).unwrap_or_else(|_| self.dir.clone());
        let variants: BTreeMap<String, String> = self.variants.into_iter().collect();
        let distribution = DistributionParams {
            offline: self.offline,
            ..DistributionParams::default()
        };

        let workbench = Workbench::new(
            ProjectState::new(&project_dir),
            Box::new(Console::new(self.json)),
            Box::new(NoEditors),
        );

        let outcome = block_on(async move {
            let host = ProjectHost::new(
                workbench,
                Arc::new(SocketBinder::new(socket)),
                Arc::new(InMemoryProjectModel::new()),
                Arc::new(ProcfsMonitor::new()),
                &config,
            );
            host.orchestrator().set_distribution(distribution);
            if !variants.is_empty() {
                host.context()
                    .run(move |wb| wb.variants.current = Some(variants))
                    .await?;
            }
            let outcome = host.open(InitOptions::fresh()).await;
            host.teardown().await?;
            Ok::<_, tandem_daemon::DaemonError>(outcome)
        })?
        .context("project host failed")?;

        let result = match outcome {
            InitOutcome::Success(result) => result,
            InitOutcome::Failure(failure) => {
                return Err(anyhow!(failure)).with_context(|| {
                    format!("failed to initialize {}", project_dir.display())
                });
            }
            InitOutcome::Cancelled => {
                bail!("initialization of {} was cancelled", project_dir.display())
            }
        };

        if self.json {
            let payload = InitJson {
                project_dir: project_dir.display().to_string(),
                result: &result,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render init JSON")?
            );
            return Ok(());
        }

        print_modules(&project_dir, &result);
        Ok(())
    }
}

fn print_modules(project_dir: &Path, result: &InitResult) {
    println!(
        "{} {} initialized",
        "■".green().bold(),
        project_dir.display()
    );
    let Some(workspace) = result.workspace.as_ref() else {
        return;
    };
    if workspace.modules.is_empty() {
        println!("No modules reported.");
        return;
    }
    let rows: Vec<ModuleRow> = workspace
        .modules
        .iter()
        .map(|m| ModuleRow {
            module: m.path.clone(),
            variant: m.selected.clone().unwrap_or_else(|| "-".to_string()),
            available: m.variants.join(", "),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
