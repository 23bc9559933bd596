//! Newline-delimited JSON protocol spoken with the tooling daemon.
//!
//! One request line, one response line, per connection.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use tandem_core::{InitRequest, Pid};

use crate::error::{io_err, DaemonError};

pub const CMD_STATUS: &str = "status";
pub const CMD_START_TOOLING: &str = "start_tooling";
pub const CMD_METADATA: &str = "metadata";
pub const CMD_INITIALIZE: &str = "initialize";

/// JSON newline-delimited request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<InitRequest>,
}

impl DaemonRequest {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            request: None,
        }
    }

    pub fn initialize(request: InitRequest) -> Self {
        Self {
            cmd: CMD_INITIALIZE.to_string(),
            request: Some(request),
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// `status` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub tooling_started: bool,
    #[serde(default)]
    pub build_in_progress: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<Pid>,
}

/// `start_tooling` / `metadata` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub pid: Pid,
}

/// Send one JSON request to the daemon socket and return one response.
pub async fn send_request(
    socket: &Path,
    request: &DaemonRequest,
) -> Result<DaemonResponse, DaemonError> {
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }

    let stream = UnixStream::connect(socket).await.map_err(|err| {
        if matches!(
            err.kind(),
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        } else {
            io_err(socket, err)
        }
    })?;

    let (reader, mut writer) = stream.into_split();
    let mut payload = serde_json::to_string(request)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err(socket, e))?;
    writer.flush().await.map_err(|e| io_err(socket, e))?;

    let mut lines = BufReader::new(reader).lines();
    let Some(line) = lines.next_line().await.map_err(|e| io_err(socket, e))? else {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    };

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

/// Send `request` and decode the payload of a successful response.
pub async fn call<T>(socket: &Path, request: &DaemonRequest) -> Result<T, DaemonError>
where
    T: for<'de> Deserialize<'de>,
{
    let response = send_request(socket, request).await?;
    let data = response_into_data(response)?;
    Ok(serde_json::from_value(data)?)
}

pub async fn request_status(socket: &Path) -> Result<ServiceStatus, DaemonError> {
    call(socket, &DaemonRequest::new(CMD_STATUS)).await
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_request_omits_payload() {
        let line = serde_json::to_string(&DaemonRequest::new(CMD_STATUS)).unwrap();
        assert_eq!(line, r#"{"cmd":"status"}"#);
    }

    #[test]
    fn initialize_request_carries_project() {
        let value =
            serde_json::to_value(DaemonRequest::initialize(InitRequest::new("/p"))).unwrap();
        assert_eq!(value["cmd"], "initialize");
        assert_eq!(value["request"]["project_dir"], "/p");
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = response_into_data(DaemonResponse::error("boom")).unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(ref m) if m == "boom"), "got: {err}");
    }

    #[test]
    fn status_fields_default_when_missing() {
        let status: ServiceStatus = serde_json::from_value(json!({})).unwrap();
        assert_eq!(status, ServiceStatus::default());
    }

    #[tokio::test]
    async fn missing_socket_means_not_running() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket = dir.path().join("tooling.sock");
        let err = request_status(&socket).await.unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
    }
}
