//! Background coordination for one project host: the build service link,
//! the init orchestrator, the document event dispatcher and the socket
//! client for the tooling daemon.

pub mod dispatcher;
mod error;
pub mod files;
pub mod host;
pub mod link;
pub mod model;
pub mod monitor;
pub mod orchestrator;
pub mod protocol;
pub mod runtime;
pub mod socket_service;

pub use dispatcher::EventDispatcher;
pub use error::DaemonError;
pub use files::{FileManager, OpenDocument};
pub use host::ProjectHost;
pub use link::{BuildEventListener, BuildService, ServiceBinder, ServiceLink, ToolingSession};
pub use model::{InMemoryProjectModel, ProjectModel, SetupError};
pub use monitor::{run_sampler, ProcessMonitor, ProcfsMonitor};
pub use orchestrator::{InitHandle, InitOptions, InitOrchestrator, InitState};
pub use protocol::{
    request_status, send_request, DaemonRequest, DaemonResponse, ServiceStatus, SessionMetadata,
};
pub use runtime::{block_on, init_tracing};
pub use socket_service::{SocketBinder, SocketBuildService};
