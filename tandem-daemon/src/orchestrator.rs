//! Init orchestrator.
//!
//! ## States
//!
//! ```text
//! IDLE → BINDING → CONNECTED → STARTING_SERVER → SERVER_READY → INITIALIZING → INITIALIZED
//!                                                                            ↘ FAILED
//! ```
//!
//! `STARTING_SERVER` is skipped when the tooling server is already running.
//! Project state is only touched through the interactive context; service
//! calls, workspace setup and the pid confirmation run off it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use tandem_core::{
    ContextError, DistributionParams, FailureKind, InitFailure, InitOutcome, InitRequest,
    InitResult, InteractiveContext, Pid, StatusAlignment, ToolingConfig,
};

use crate::error::DaemonError;
use crate::link::{BuildEventListener, BuildService, ServiceBinder, ServiceLink, ToolingSession};
use crate::model::{describe_setup_error, ProjectModel, SetupError, NULL_WORKSPACE_MESSAGE};
use crate::monitor::ProcessMonitor;

pub const STATUS_INITIALIZING: &str = "Initializing project";
pub const STATUS_INITIALIZED: &str = "Project initialized";
pub const STATUS_INIT_FAILED: &str = "Project initialization failed";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitState {
    Idle,
    Binding,
    Connected,
    StartingServer,
    ServerReady,
    Initializing,
    Initialized,
    Failed,
}

impl InitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitState::Idle => "IDLE",
            InitState::Binding => "BINDING",
            InitState::Connected => "CONNECTED",
            InitState::StartingServer => "STARTING_SERVER",
            InitState::ServerReady => "SERVER_READY",
            InitState::Initializing => "INITIALIZING",
            InitState::Initialized => "INITIALIZED",
            InitState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an initialization was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// The host was recreated and is restoring its saved state.
    pub resume_from_saved: bool,
    /// Initialize even when a cached result could be reused.
    pub force: bool,
}

impl InitOptions {
    pub fn fresh() -> Self {
        Self::default()
    }

    pub fn resume() -> Self {
        Self {
            resume_from_saved: true,
            force: false,
        }
    }

    pub fn forced() -> Self {
        Self {
            resume_from_saved: false,
            force: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cancellable handle to one in-flight initialization. Clones share the outcome.
#[derive(Debug, Clone)]
pub struct InitHandle {
    cancel: CancellationToken,
    outcome: watch::Receiver<Option<InitOutcome>>,
}

impl InitHandle {
    /// Interrupt the initialization. The outcome becomes [`InitOutcome::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    pub async fn outcome(&self) -> InitOutcome {
        let mut outcome = self.outcome.clone();
        let value = match outcome.wait_for(Option::is_some).await {
            Ok(value) => value.clone().unwrap_or(InitOutcome::Cancelled),
            Err(_) => InitOutcome::Cancelled,
        };
        value
    }
}

enum Plan {
    Resume(InitResult),
    Submit(InitRequest),
    NoProject,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Cheap, cloneable handle to the orchestrator.
#[derive(Clone)]
pub struct InitOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: InteractiveContext,
    link: tokio::sync::Mutex<ServiceLink>,
    model: Arc<dyn ProjectModel>,
    monitor: Arc<dyn ProcessMonitor>,
    config: ToolingConfig,
    distribution: Mutex<DistributionParams>,
    history: Mutex<Vec<InitState>>,
    session: Mutex<Option<ToolingSession>>,
    in_flight: Mutex<Option<InitHandle>>,
    /// Bumped for every submitted initialization.
    generation: AtomicU64,
    listener: Arc<dyn BuildEventListener>,
    shutdown: CancellationToken,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InitOrchestrator {
    pub fn new(
        ctx: InteractiveContext,
        binder: Arc<dyn ServiceBinder>,
        model: Arc<dyn ProjectModel>,
        monitor: Arc<dyn ProcessMonitor>,
        config: ToolingConfig,
    ) -> Self {
        let listener = Arc::new(WorkbenchBuildListener { ctx: ctx.clone() });
        Self {
            inner: Arc::new(Inner {
                ctx,
                link: tokio::sync::Mutex::new(ServiceLink::new(binder)),
                model,
                monitor,
                config,
                distribution: Mutex::new(DistributionParams::default()),
                history: Mutex::new(vec![InitState::Idle]),
                session: Mutex::new(None),
                in_flight: Mutex::new(None),
                generation: AtomicU64::new(0),
                listener,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn set_distribution(&self, distribution: DistributionParams) {
        *lock(&self.inner.distribution) = distribution;
    }

    pub fn state(&self) -> InitState {
        lock(&self.inner.history)
            .last()
            .copied()
            .unwrap_or(InitState::Idle)
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> Vec<InitState> {
        lock(&self.inner.history).clone()
    }

    pub fn session(&self) -> Option<ToolingSession> {
        *lock(&self.inner.session)
    }

    fn transition(&self, to: InitState) {
        let mut history = lock(&self.inner.history);
        let from = history.last().copied().unwrap_or(InitState::Idle);
        if from == to {
            return;
        }
        tracing::debug!(%from, %to, "orchestrator state");
        history.push(to);
    }

    // -----------------------------------------------------------------------
    // Binding and tooling server
    // -----------------------------------------------------------------------

    /// Bind the service and make sure the tooling server runs.
    pub async fn start(&self) -> Result<(), InitFailure> {
        self.transition(InitState::Binding);
        let bound = {
            let mut link = self.inner.link.lock().await;
            let listener = self.inner.listener.clone();
            link.set_on_connected(move |service| service.set_event_listener(Some(listener)));
            link.bind().await
        };
        let service = match bound {
            Ok(service) => service,
            Err(err) => return Err(self.service_unavailable(err).await),
        };
        self.transition(InitState::Connected);

        if service.is_tooling_server_started() {
            tracing::debug!("tooling server already running");
        } else {
            self.transition(InitState::StartingServer);
            let pid = match service.start_tooling_server().await {
                Ok(pid) => pid,
                Err(err) => return Err(self.service_unavailable(err).await),
            };
            tracing::info!(%pid, "tooling server started");
            *lock(&self.inner.session) = Some(ToolingSession::started(pid));
            self.watch_tooling_pid(pid);
            self.spawn_pid_confirmation(service);
        }

        self.transition(InitState::ServerReady);
        Ok(())
    }

    async fn service_unavailable(&self, err: DaemonError) -> InitFailure {
        tracing::error!(error = %err, "build service unavailable");
        self.transition(InitState::Failed);
        let failure = InitFailure::ServiceUnavailable(err.to_string());
        let message = failure.to_string();
        if let Err(err) = self
            .inner
            .ctx
            .run(move |wb| wb.surface.show_error(&message))
            .await
        {
            tracing::debug!(error = %err, "could not surface service error");
        }
        failure
    }

    fn watch_tooling_pid(&self, pid: Pid) {
        self.inner
            .monitor
            .watch_process(pid, &self.inner.config.process_label);
        let usages = self.inner.monitor.memory_usages();
        if self
            .inner
            .ctx
            .post(move |wb| wb.reset_memory_chart(&usages))
            .is_err()
        {
            tracing::debug!("interactive context closed, memory chart not reset");
        }
    }

    /// Fetch session metadata in the background and re-attach monitoring
    /// when the confirmed pid differs from the reported one.
    fn spawn_pid_confirmation(&self, service: Arc<dyn BuildService>) {
        let orchestrator = self.clone();
        let timeout = self.inner.config.metadata_timeout();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            let fetched = tokio::select! {
                _ = shutdown.cancelled() => return,
                fetched = tokio::time::timeout(timeout, service.metadata()) => fetched,
            };
            match fetched {
                Ok(Ok(metadata)) => orchestrator.confirm_pid(metadata.pid),
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "failed to get tooling server metadata, keeping reported pid");
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        "tooling server metadata timed out, keeping reported pid",
                    );
                }
            }
        });
    }

    fn confirm_pid(&self, pid: Pid) {
        let drifted = {
            let mut session = lock(&self.inner.session);
            match session.as_mut() {
                Some(session) => {
                    let reported = session.reported_pid;
                    session.confirm(pid).then_some(reported)
                }
                None => None,
            }
        };
        if let Some(reported) = drifted {
            tracing::warn!(expected = %reported, actual = %pid, "tooling server pid mismatch, replacing memory watcher");
            self.watch_tooling_pid(pid);
        }
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// Submit an initialization. While one is in flight and not cancelled,
    /// its handle is returned instead and nothing new is submitted.
    pub fn initialize(&self, options: InitOptions) -> InitHandle {
        let mut in_flight = lock(&self.inner.in_flight);
        if let Some(handle) = in_flight.as_ref() {
            if !handle.is_finished() && !handle.is_cancelled() {
                tracing::debug!("initialization already in flight");
                return handle.clone();
            }
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = watch::channel(None);
        let cancel = self.inner.shutdown.child_token();
        let handle = InitHandle {
            cancel: cancel.clone(),
            outcome: rx,
        };
        *in_flight = Some(handle.clone());
        drop(in_flight);

        let orchestrator = self.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                outcome = orchestrator.drive(options) => Some(outcome),
            };
            let outcome = match outcome {
                Some(outcome) => outcome,
                None => {
                    orchestrator.on_cancelled(generation).await;
                    InitOutcome::Cancelled
                }
            };
            let _ = tx.send(Some(outcome));
        });
        handle
    }

    async fn drive(&self, options: InitOptions) -> InitOutcome {
        match self.try_drive(options).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::debug!(error = %err, "interactive context closed during initialization");
                InitOutcome::Cancelled
            }
        }
    }

    async fn try_drive(&self, options: InitOptions) -> Result<InitOutcome, ContextError> {
        let distribution = lock(&self.inner.distribution).clone();
        let plan = self
            .inner
            .ctx
            .run(move |wb| {
                if options.resume_from_saved && !options.force {
                    if let Some(cached) = wb.project.resumable_result() {
                        return Plan::Resume(cached.clone());
                    }
                }
                let Some(dir) = wb.project.project_dir.clone() else {
                    return Plan::NoProject;
                };
                wb.project.initializing = true;
                wb.set_status(STATUS_INITIALIZING, StatusAlignment::Center);
                Plan::Submit(
                    InitRequest::new(dir)
                        .with_distribution(distribution)
                        .with_variants(wb.variants.effective()),
                )
            })
            .await?;

        let request = match plan {
            Plan::Resume(cached) => {
                tracing::info!("project already initialized, using cached result");
                self.transition(InitState::Initialized);
                return Ok(InitOutcome::Success(cached));
            }
            Plan::NoProject => {
                tracing::error!("no project directory set");
                return self
                    .finish_failure(InitFailure::Initialization(FailureKind::NotFound))
                    .await;
            }
            Plan::Submit(request) => request,
        };
        self.transition(InitState::Initializing);

        if let Some(kind) = FailureKind::classify_dir(&request.project_dir) {
            tracing::error!(dir = %request.project_dir.display(), %kind, "project directory rejected");
            return self
                .finish_failure(InitFailure::Initialization(kind))
                .await;
        }

        let service = self.inner.link.lock().await.service();
        let Some(service) = service else {
            return self
                .finish_failure(InitFailure::ServiceUnavailable(
                    DaemonError::NotConnected.to_string(),
                ))
                .await;
        };
        if !service.is_tooling_server_started() {
            return self
                .finish_failure(InitFailure::ServiceUnavailable(
                    "tooling server is not running".to_string(),
                ))
                .await;
        }

        tracing::info!(
            project = %request.project_dir.display(),
            variants = request.variant_selections.len(),
            "sending init request to tooling server",
        );
        let submitted = service.initialize_project(request).await;
        service.set_event_listener(None);

        let result = match submitted {
            Ok(result) => result,
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                return self
                    .finish_failure(InitFailure::ServiceUnavailable(err.to_string()))
                    .await;
            }
            Err(err) => {
                tracing::error!(error = %err, "initialization request failed");
                return self
                    .finish_failure(InitFailure::Initialization(FailureKind::Unknown))
                    .await;
            }
        };

        if !result.successful {
            let kind = result.failure_kind();
            tracing::error!(?kind, "tooling server reported initialization failure");
            return self
                .finish_failure(InitFailure::Initialization(kind))
                .await;
        }

        self.setup_workspace(result).await
    }

    async fn setup_workspace(&self, result: InitResult) -> Result<InitOutcome, ContextError> {
        let model = self.inner.model.clone();
        let reported = result.clone();
        let setup = tokio::task::spawn_blocking(move || {
            model.setup_project(&reported)?;
            Ok::<_, SetupError>(model.workspace())
        })
        .await;

        let workspace = match setup {
            Ok(Ok(Some(workspace))) => workspace,
            Ok(Ok(None)) => {
                tracing::error!("workspace is null after project setup");
                return self
                    .finish_failure(InitFailure::WorkspaceSetup(NULL_WORKSPACE_MESSAGE.to_string()))
                    .await;
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "project setup failed");
                return self
                    .finish_failure(InitFailure::WorkspaceSetup(describe_setup_error(&err)))
                    .await;
            }
            Err(err) => {
                tracing::error!(error = %err, "project setup task failed");
                let err = SetupError(err.to_string());
                return self
                    .finish_failure(InitFailure::WorkspaceSetup(describe_setup_error(&err)))
                    .await;
            }
        };

        self.inner.model.notify_project_update();
        let cached = result.clone();
        self.inner
            .ctx
            .run(move |wb| {
                wb.variants.adopt(workspace.variant_selections());
                wb.project.workspace = Some(workspace);
                wb.project.cached_init_result = Some(cached);
                wb.project.initialized = true;
                wb.project.initializing = false;
                wb.dismiss_sync_needed();
                wb.set_status(STATUS_INITIALIZED, StatusAlignment::Center);
            })
            .await?;
        self.transition(InitState::Initialized);
        tracing::info!("project initialized");
        Ok(InitOutcome::Success(result))
    }

    async fn finish_failure(&self, failure: InitFailure) -> Result<InitOutcome, ContextError> {
        self.transition(InitState::Failed);
        let status = match failure.kind() {
            Some(kind) => format!("{STATUS_INIT_FAILED}: {}", kind.message()),
            None => STATUS_INIT_FAILED.to_string(),
        };
        let message = failure.to_string();
        self.inner
            .ctx
            .run(move |wb| {
                wb.project.initialized = false;
                wb.project.initializing = false;
                wb.set_status(&status, StatusAlignment::Center);
                wb.surface.show_error(&message);
            })
            .await?;
        Ok(InitOutcome::Failure(failure))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    /// Release the build listener and, unless a newer initialization has
    /// been submitted since, clear the flags the cancelled one set.
    async fn on_cancelled(&self, generation: u64) {
        tracing::debug!(generation, "initialization cancelled");
        let service = self.inner.link.lock().await.service();
        if let Some(service) = service {
            service.set_event_listener(None);
        }

        // Checked on the context so a newer submission cannot slip in between.
        let orchestrator = self.clone();
        let cleaned = self
            .inner
            .ctx
            .run(move |wb| {
                if !orchestrator.is_current(generation) {
                    return false;
                }
                wb.project.initializing = false;
                if orchestrator.state() == InitState::Initializing {
                    orchestrator.transition(InitState::ServerReady);
                }
                true
            })
            .await;
        match cleaned {
            Ok(true) => {}
            Ok(false) => tracing::debug!(generation, "superseded by a newer initialization"),
            Err(_) => tracing::debug!("interactive context closed before cancel cleanup"),
        }
    }

    // -----------------------------------------------------------------------
    // Sync prompt
    // -----------------------------------------------------------------------

    /// Show the "sync needed" prompt unless an initialization or a build is
    /// running, or the prompt is already up. Returns whether it was shown.
    pub async fn notify_sync_needed(&self) -> Result<bool, DaemonError> {
        let service = self.inner.link.lock().await.service();
        let Some(service) = service else {
            tracing::debug!("no build service, sync prompt suppressed");
            return Ok(false);
        };
        if service.is_build_in_progress() {
            tracing::debug!("build in progress, sync prompt suppressed");
            return Ok(false);
        }
        let shown = self
            .inner
            .ctx
            .run(|wb| {
                if wb.project.initializing || wb.project.build_in_progress {
                    return false;
                }
                wb.show_sync_needed()
            })
            .await?;
        Ok(shown)
    }

    /// Accept the prompt: dismiss it and force a fresh initialization.
    pub async fn accept_sync(&self) -> Result<InitHandle, DaemonError> {
        self.inner.ctx.run(|wb| wb.dismiss_sync_needed()).await?;
        Ok(self.initialize(InitOptions::forced()))
    }

    pub async fn dismiss_sync(&self) -> Result<(), DaemonError> {
        self.inner.ctx.run(|wb| wb.dismiss_sync_needed()).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Cancel the in-flight initialization, release the build listener and unbind.
    pub async fn teardown(&self) {
        let in_flight = lock(&self.inner.in_flight).take();
        if let Some(handle) = in_flight {
            handle.cancel();
        }
        self.inner.shutdown.cancel();

        let mut link = self.inner.link.lock().await;
        if let Some(service) = link.service() {
            service.set_event_listener(None);
        }
        link.unbind().await;
        drop(link);

        *lock(&self.inner.session) = None;
        self.transition(InitState::Idle);
    }
}

impl fmt::Debug for InitOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitOrchestrator")
            .field("state", &self.state())
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Build listener
// ---------------------------------------------------------------------------

/// Mirrors build progress into project state on the interactive context.
struct WorkbenchBuildListener {
    ctx: InteractiveContext,
}

impl BuildEventListener for WorkbenchBuildListener {
    fn on_build_started(&self) {
        tracing::debug!("build started");
        let _ = self.ctx.post(|wb| wb.set_build_in_progress(true));
    }

    fn on_build_finished(&self, successful: bool) {
        tracing::debug!(successful, "build finished");
        let _ = self.ctx.post(|wb| wb.set_build_in_progress(false));
    }
}
