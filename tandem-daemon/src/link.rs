//! Process link: a reconnectable handle to the out-of-process build service.

use std::sync::Arc;

use async_trait::async_trait;

use tandem_core::{InitRequest, InitResult, Pid};

use crate::error::DaemonError;
use crate::protocol::SessionMetadata;

// ---------------------------------------------------------------------------
// Collaborator contracts
// ---------------------------------------------------------------------------

/// Build progress callbacks from the service. May fire on any thread.
pub trait BuildEventListener: Send + Sync {
    fn on_build_started(&self);

    fn on_build_finished(&self, successful: bool);
}

/// The build / tooling service, as seen by the orchestrator.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Launch the tooling subprocess and return the pid it reported.
    async fn start_tooling_server(&self) -> Result<Pid, DaemonError>;

    fn is_tooling_server_started(&self) -> bool;

    /// Session metadata; its pid is the confirmed one.
    async fn metadata(&self) -> Result<SessionMetadata, DaemonError>;

    async fn initialize_project(&self, request: InitRequest) -> Result<InitResult, DaemonError>;

    fn is_build_in_progress(&self) -> bool;

    /// Register, or release with `None`, the build event listener.
    fn set_event_listener(&self, listener: Option<Arc<dyn BuildEventListener>>);
}

/// Binds and unbinds the build service.
#[async_trait]
pub trait ServiceBinder: Send + Sync {
    async fn bind(&self) -> Result<Arc<dyn BuildService>, DaemonError>;

    async fn unbind(&self);
}

// ---------------------------------------------------------------------------
// ServiceLink
// ---------------------------------------------------------------------------

type OnConnected = Box<dyn FnOnce(&Arc<dyn BuildService>) + Send>;

/// Bind state plus an at-most-once connect callback.
pub struct ServiceLink {
    binder: Arc<dyn ServiceBinder>,
    service: Option<Arc<dyn BuildService>>,
    on_connected: Option<OnConnected>,
}

impl ServiceLink {
    pub fn new(binder: Arc<dyn ServiceBinder>) -> Self {
        Self {
            binder,
            service: None,
            on_connected: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.service.is_some()
    }

    pub fn service(&self) -> Option<Arc<dyn BuildService>> {
        self.service.clone()
    }

    /// Callback for the next connect. Consumed by the first `bind` that succeeds.
    pub fn set_on_connected(&mut self, f: impl FnOnce(&Arc<dyn BuildService>) + Send + 'static) {
        self.on_connected = Some(Box::new(f));
    }

    /// Bind, or reuse the service already bound.
    pub async fn bind(&mut self) -> Result<Arc<dyn BuildService>, DaemonError> {
        let service = match &self.service {
            Some(service) => {
                tracing::debug!("build service already bound, reusing");
                service.clone()
            }
            None => {
                let service = self.binder.bind().await?;
                tracing::info!("connected to build service");
                self.service = Some(service.clone());
                service
            }
        };
        if let Some(on_connected) = self.on_connected.take() {
            on_connected(&service);
        }
        Ok(service)
    }

    pub async fn unbind(&mut self) {
        self.on_connected = None;
        if self.service.take().is_some() {
            self.binder.unbind().await;
            tracing::info!("unbound build service");
        }
    }
}

impl std::fmt::Debug for ServiceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLink")
            .field("connected", &self.is_connected())
            .field("on_connected", &self.on_connected.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ToolingSession
// ---------------------------------------------------------------------------

/// One started tooling subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolingSession {
    pub reported_pid: Pid,
    /// Pid from the session metadata, once it arrived.
    pub confirmed_pid: Option<Pid>,
    pub started: bool,
}

impl ToolingSession {
    pub fn started(reported_pid: Pid) -> Self {
        Self {
            reported_pid,
            confirmed_pid: None,
            started: true,
        }
    }

    /// The pid monitoring should follow.
    pub fn pid(&self) -> Pid {
        self.confirmed_pid.unwrap_or(self.reported_pid)
    }

    /// Record the confirmed pid. Returns whether it differs from the reported one.
    pub fn confirm(&mut self, pid: Pid) -> bool {
        self.confirmed_pid = Some(pid);
        pid != self.reported_pid
    }
}
