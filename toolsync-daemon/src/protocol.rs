use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use toolsync_core::SyncRoot;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DaemonRequest {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            reason: None,
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

    /// Payload of a successful response; a refusal becomes a protocol error.
    pub fn into_data(self) -> Result<Value, DaemonError> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(DaemonError::Protocol(
                self.error
                    .unwrap_or_else(|| "unknown daemon error".to_string()),
            ))
        }
    }
}

/// One request/response exchange over the control socket.
///
/// A missing socket, or one nobody is listening on, is reported as
/// [`DaemonError::DaemonNotRunning`] so callers can fall back to local work.
pub fn send_request(root: &SyncRoot, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(root);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }
    let stream = UnixStream::connect(&socket).map_err(|err| match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        }
        _ => io_err(&socket, err),
    })?;

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    (&stream)
        .write_all(line.as_bytes())
        .map_err(|e| io_err(&socket, e))?;

    let reply = BufReader::new(&stream)
        .lines()
        .next()
        .transpose()
        .map_err(|e| io_err(&socket, e))?
        .ok_or_else(|| {
            DaemonError::Protocol("daemon closed connection before responding".to_string())
        })?;
    Ok(serde_json::from_str(&reply)?)
}

/// Attempts made by [`request_status`] while a freshly started daemon binds.
const STATUS_ATTEMPTS: u32 = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Send `request` and unwrap the response payload.
fn call(root: &SyncRoot, request: &DaemonRequest) -> Result<Value, DaemonError> {
    send_request(root, request)?.into_data()
}

/// Scheduler and revision status. Retries while the socket is not yet bound.
pub fn request_status(root: &SyncRoot) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");
    let mut attempt = 1;
    loop {
        match call(root, &request) {
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < STATUS_ATTEMPTS => {
                attempt += 1;
                sleep(STATUS_RETRY_DELAY);
            }
            result => return result,
        }
    }
}

pub fn request_stop(root: &SyncRoot) -> Result<(), DaemonError> {
    call(root, &DaemonRequest::new("stop")).map(|_| ())
}

/// Ask the daemon to run (or queue) a cycle tagged with `reason`.
pub fn request_cycle(root: &SyncRoot, reason: Option<String>) -> Result<Value, DaemonError> {
    call(
        root,
        &DaemonRequest {
            cmd: "cycle".to_string(),
            reason,
        },
    )
}

/// Ask the daemon to write a diagnostic report; the payload carries its path.
pub fn request_report(root: &SyncRoot) -> Result<Value, DaemonError> {
    call(root, &DaemonRequest::new("report"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_socket_means_not_running() {
        let tmp = TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());
        let err = request_stop(&root).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }

    #[test]
    fn stale_socket_file_means_not_running() {
        let tmp = TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());
        std::fs::write(socket_path(&root), "").unwrap();
        let err = request_status(&root).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }

    #[test]
    fn request_omits_absent_reason() {
        let encoded = serde_json::to_string(&DaemonRequest::new("status")).unwrap();
        assert_eq!(encoded, r#"{"cmd":"status"}"#);
        let decoded: DaemonRequest =
            serde_json::from_str(r#"{"cmd":"cycle","reason":"manual"}"#).unwrap();
        assert_eq!(decoded.reason.as_deref(), Some("manual"));
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = DaemonResponse::error("nope").into_data().unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(ref m) if m == "nope"));
    }
}
