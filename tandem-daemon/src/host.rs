//! One project host: the interactive context plus the components that share it.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tandem_core::{
    EditorRef, InitOutcome, InteractiveContext, ProjectState, TandemConfig, Workbench,
};
use tandem_sync::AutoSaveEngine;

use crate::dispatcher::EventDispatcher;
use crate::error::DaemonError;
use crate::files::FileManager;
use crate::link::ServiceBinder;
use crate::model::ProjectModel;
use crate::monitor::{run_sampler, ProcessMonitor};
use crate::orchestrator::{InitOptions, InitOrchestrator};

pub struct ProjectHost {
    ctx: InteractiveContext,
    orchestrator: InitOrchestrator,
    autosave: AutoSaveEngine,
    files: Arc<FileManager>,
    sampler: Mutex<Option<JoinHandle<()>>>,
    sampler_cancel: CancellationToken,
    _owner: JoinHandle<Workbench>,
}

impl ProjectHost {
    pub fn new(
        workbench: Workbench,
        binder: Arc<dyn ServiceBinder>,
        model: Arc<dyn ProjectModel>,
        monitor: Arc<dyn ProcessMonitor>,
        config: &TandemConfig,
    ) -> Self {
        let (ctx, owner) = InteractiveContext::spawn(workbench);
        let sampler_cancel = CancellationToken::new();
        let sampler = tokio::spawn(run_sampler(
            monitor.clone(),
            config.tooling.sample_interval(),
            sampler_cancel.clone(),
        ));
        let orchestrator =
            InitOrchestrator::new(ctx.clone(), binder, model, monitor, config.tooling.clone());
        let autosave = AutoSaveEngine::new(ctx.clone(), config.autosave.clone());
        Self {
            ctx,
            orchestrator,
            autosave,
            files: Arc::new(FileManager::new()),
            sampler: Mutex::new(Some(sampler)),
            sampler_cancel,
            _owner: owner,
        }
    }

    pub fn context(&self) -> &InteractiveContext {
        &self.ctx
    }

    pub fn orchestrator(&self) -> &InitOrchestrator {
        &self.orchestrator
    }

    pub fn autosave(&self) -> &AutoSaveEngine {
        &self.autosave
    }

    pub fn files(&self) -> Arc<FileManager> {
        self.files.clone()
    }

    /// Dispatcher for the documents of one editor.
    pub fn dispatcher_for(&self, editor: &Arc<EditorRef>) -> EventDispatcher {
        EventDispatcher::spawn(editor, self.files.clone())
    }

    /// Bind the service, start auto-save and initialize the project.
    pub async fn open(&self, options: InitOptions) -> InitOutcome {
        if let Err(failure) = self.orchestrator.start().await {
            return InitOutcome::Failure(failure);
        }
        self.autosave.start();
        self.orchestrator.initialize(options).outcome().await
    }

    /// Flush pending saves, cancel initialization, stop the memory sampler,
    /// unbind and clear the transient project flags.
    ///
    /// Returns the project state to hand to a recreated host; opening that
    /// host with [`InitOptions::resume`] reuses the cached result.
    pub async fn teardown(&self) -> Result<ProjectState, DaemonError> {
        self.ctx.run(|wb| wb.destroying = true).await?;

        let report = self.autosave.shutdown().await?;
        if !report.failed.is_empty() {
            tracing::warn!(failed = report.failed.len(), "final auto-save flush had failures");
        }

        self.orchestrator.teardown().await;

        self.sampler_cancel.cancel();
        let sampler = self
            .sampler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sampler) = sampler {
            let _ = sampler.await;
        }

        let state = self
            .ctx
            .run(|wb| {
                wb.project.reset();
                wb.project.clone()
            })
            .await?;
        tracing::info!("project host torn down");
        Ok(state)
    }
}

impl std::fmt::Debug for ProjectHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectHost")
            .field("orchestrator", &self.orchestrator)
            .field("autosave", &self.autosave)
            .finish_non_exhaustive()
    }
}
