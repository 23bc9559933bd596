//! Build service backed by the tooling daemon's Unix socket.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use tandem_core::{InitRequest, InitResult, Pid};

use crate::error::DaemonError;
use crate::link::{BuildEventListener, BuildService, ServiceBinder};
use crate::protocol::{
    call, request_status, DaemonRequest, ServiceStatus, SessionMetadata, CMD_METADATA,
    CMD_START_TOOLING,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Binds by probing the daemon socket.
#[derive(Debug, Clone)]
pub struct SocketBinder {
    socket: PathBuf,
}

impl SocketBinder {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }
}

#[async_trait]
impl ServiceBinder for SocketBinder {
    async fn bind(&self) -> Result<Arc<dyn BuildService>, DaemonError> {
        let service = SocketBuildService::new(&self.socket);
        service.refresh_status().await?;
        Ok(Arc::new(service))
    }

    async fn unbind(&self) {
        tracing::debug!(socket = %self.socket.display(), "released tooling daemon socket");
    }
}

/// `is_*` queries answer from the last status the daemon reported.
pub struct SocketBuildService {
    socket: PathBuf,
    status: Mutex<ServiceStatus>,
    listener: Mutex<Option<Arc<dyn BuildEventListener>>>,
}

impl SocketBuildService {
    pub fn new(socket: &Path) -> Self {
        Self {
            socket: socket.to_path_buf(),
            status: Mutex::new(ServiceStatus::default()),
            listener: Mutex::new(None),
        }
    }

    pub async fn refresh_status(&self) -> Result<ServiceStatus, DaemonError> {
        let status = request_status(&self.socket).await?;
        *lock(&self.status) = status.clone();
        Ok(status)
    }

    fn listener(&self) -> Option<Arc<dyn BuildEventListener>> {
        lock(&self.listener).clone()
    }
}

#[async_trait]
impl BuildService for SocketBuildService {
    async fn start_tooling_server(&self) -> Result<Pid, DaemonError> {
        let metadata: SessionMetadata =
            call(&self.socket, &DaemonRequest::new(CMD_START_TOOLING)).await?;
        let mut status = lock(&self.status);
        status.tooling_started = true;
        status.pid = Some(metadata.pid);
        Ok(metadata.pid)
    }

    fn is_tooling_server_started(&self) -> bool {
        lock(&self.status).tooling_started
    }

    async fn metadata(&self) -> Result<SessionMetadata, DaemonError> {
        call(&self.socket, &DaemonRequest::new(CMD_METADATA)).await
    }

    async fn initialize_project(&self, request: InitRequest) -> Result<InitResult, DaemonError> {
        if let Some(listener) = self.listener() {
            listener.on_build_started();
        }
        lock(&self.status).build_in_progress = true;

        let result: Result<InitResult, DaemonError> =
            call(&self.socket, &DaemonRequest::initialize(request)).await;

        lock(&self.status).build_in_progress = false;
        if let Some(listener) = self.listener() {
            listener.on_build_finished(result.as_ref().is_ok_and(|r| r.successful));
        }
        result
    }

    fn is_build_in_progress(&self) -> bool {
        lock(&self.status).build_in_progress
    }

    fn set_event_listener(&self, listener: Option<Arc<dyn BuildEventListener>>) {
        *lock(&self.listener) = listener;
    }
}
