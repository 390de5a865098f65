//! IPC server for operator commands.
//!
//! A Unix Domain Socket accepting newline-delimited JSON commands. Commands
//! are not executed on the connection task: each one is forwarded to the
//! tick loop with a reply channel, so the monitor only ever sees them
//! between ticks.

use crate::error::IpcError;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

#[cfg(unix)]
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// Default socket path for IPC communication.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/air-monitor.sock";

/// Pending commands the tick loop has not picked up yet.
const COMMAND_QUEUE_DEPTH: usize = 16;

/// Commands that can be received via IPC.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "command")]
pub enum IpcCommand {
    /// Re-initialize the IAQ algorithm.
    ResetBaseline,
    /// Save the current baseline now, regardless of air quality.
    SaveBaseline,
    /// Report the sensor's current baseline.
    GetBaseline,
    GetStatus,
}

/// Status response sent to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    /// Latest reading; null before the first sample and after a failed one.
    pub tvoc: Option<u16>,
    pub eco2: Option<u16>,
    pub sensor_connected: bool,
    pub demo: bool,
    /// Latest reading satisfies the clean-air predicate.
    pub clean_air: bool,
    /// A clean-air stability window is open.
    pub clean_air_detected: bool,
    pub remaining_secs: u64,
    pub warming_up: bool,
}

/// A command plus the channel its reply goes back on.
pub type CommandRequest = (IpcCommand, oneshot::Sender<serde_json::Value>);

/// Handle used by connection tasks to reach the tick loop.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<CommandRequest>,
}

impl CommandSender {
    /// Create a sender and the receiver the tick loop drains.
    pub fn channel() -> (Self, mpsc::Receiver<CommandRequest>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        (Self { tx }, rx)
    }

    /// Queue `command` and wait for the tick loop's reply.
    pub async fn request(&self, command: IpcCommand) -> Result<serde_json::Value, IpcError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((command, reply_tx))
            .await
            .map_err(|_| IpcError::MonitorGone)?;
        reply_rx.await.map_err(|_| IpcError::MonitorGone)
    }
}

/// Parse one request line and produce the reply to send back.
pub async fn handle_line(line: &str, commands: &CommandSender) -> serde_json::Value {
    match serde_json::from_str::<IpcCommand>(line) {
        Ok(command) => match commands.request(command).await {
            Ok(response) => response,
            Err(e) => serde_json::json!({ "success": false, "error": e.to_string() }),
        },
        Err(e) => serde_json::json!({
            "error": format!("Invalid command: {}", e)
        }),
    }
}

/// Unix Domain Socket server for IPC.
#[cfg(unix)]
pub struct IpcServer {
    /// Path to the Unix socket
    socket_path: PathBuf,
    /// Unix listener for incoming connections
    listener: UnixListener,
}

#[cfg(unix)]
impl IpcServer {
    /// Bind a new server at `path`, replacing any stale socket file.
    pub async fn new(path: &str) -> Result<Self, IpcError> {
        let socket_path = PathBuf::from(path);

        Self::cleanup_socket(&socket_path)?;

        let listener = UnixListener::bind(&socket_path).map_err(|e| IpcError::SocketBindFailed {
            path: path.to_string(),
            source: e,
        })?;

        Ok(Self {
            socket_path,
            listener,
        })
    }

    fn cleanup_socket(path: &Path) -> Result<(), IpcError> {
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| IpcError::SocketBindFailed {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections forever, one task per client.
    pub async fn run(&self, commands: CommandSender) -> Result<(), IpcError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let commands = commands.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, commands).await {
                            tracing::warn!("Error handling IPC connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting IPC connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(stream: UnixStream, commands: CommandSender) -> Result<(), IpcError> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        while reader.read_line(&mut line).await? > 0 {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                line.clear();
                continue;
            }

            let response = handle_line(trimmed, &commands).await;

            let response_str = serde_json::to_string(&response)?;
            writer.write_all(response_str.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;

            line.clear();
        }

        Ok(())
    }
}

#[cfg(unix)]
impl Drop for IpcServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Stand-in for the tick loop: answers every command with its name.
    fn spawn_echo_loop(mut rx: mpsc::Receiver<CommandRequest>) -> tokio::task::JoinHandle<usize> {
        tokio::spawn(async move {
            let mut handled = 0;
            while let Some((command, reply)) = rx.recv().await {
                handled += 1;
                let _ = reply.send(serde_json::json!({ "handled": format!("{:?}", command) }));
            }
            handled
        })
    }

    #[test]
    fn test_command_wire_format() {
        let json = serde_json::to_string(&IpcCommand::SaveBaseline).unwrap();
        assert_eq!(json, r#"{"command":"SaveBaseline"}"#);

        for name in ["ResetBaseline", "SaveBaseline", "GetBaseline", "GetStatus"] {
            let line = format!(r#"{{"command":"{}"}}"#, name);
            assert!(serde_json::from_str::<IpcCommand>(&line).is_ok(), "{}", name);
        }
        assert!(serde_json::from_str::<IpcCommand>(r#"{"command":"Start"}"#).is_err());
    }

    #[test]
    fn test_status_response_fields() {
        let status = StatusResponse {
            tvoc: Some(12),
            eco2: Some(415),
            sensor_connected: true,
            demo: false,
            clean_air: true,
            clean_air_detected: true,
            remaining_secs: 321,
            warming_up: false,
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["eco2"], 415);
        assert_eq!(value["remaining_secs"], 321);

        let idle = StatusResponse {
            tvoc: None,
            eco2: None,
            ..status
        };
        assert!(serde_json::to_value(&idle).unwrap()["tvoc"].is_null());
        assert_eq!(value["clean_air_detected"], true);
    }

    #[tokio::test]
    async fn test_handle_line_forwards_to_loop() {
        let (commands, rx) = CommandSender::channel();
        let worker = spawn_echo_loop(rx);

        let response = handle_line(r#"{"command":"GetBaseline"}"#, &commands).await;
        assert_eq!(response["handled"], "GetBaseline");

        drop(commands);
        assert_eq!(worker.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_handle_line_rejects_garbage_without_forwarding() {
        let (commands, rx) = CommandSender::channel();
        let worker = spawn_echo_loop(rx);

        let response = handle_line("not json", &commands).await;
        assert!(response["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid command"));

        drop(commands);
        assert_eq!(worker.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_request_fails_when_loop_is_gone() {
        let (commands, rx) = CommandSender::channel();
        drop(rx);

        assert!(matches!(
            commands.request(IpcCommand::GetStatus).await,
            Err(IpcError::MonitorGone)
        ));
        let response = handle_line(r#"{"command":"GetStatus"}"#, &commands).await;
        assert_eq!(response["success"], false);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ipc_server_creation_and_cleanup() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let path_str = socket_path.to_str().unwrap();

        let server = IpcServer::new(path_str).await.unwrap();
        assert!(socket_path.exists());

        drop(server);
        assert!(!socket_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ipc_server_replaces_existing_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let path_str = socket_path.to_str().unwrap();

        std::fs::write(&socket_path, "dummy").unwrap();

        let server = IpcServer::new(path_str).await.unwrap();
        assert!(socket_path.exists());
        drop(server);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_socket_round_trip() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("monitor.sock");
        let server = IpcServer::new(socket_path.to_str().unwrap()).await.unwrap();

        let (commands, rx) = CommandSender::channel();
        let _worker = spawn_echo_loop(rx);
        tokio::spawn(async move {
            let _ = server.run(commands).await;
        });

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(b"{\"command\":\"ResetBaseline\"}\n")
            .await
            .unwrap();

        let mut reply = String::new();
        BufReader::new(reader).read_line(&mut reply).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(reply.trim()).unwrap();
        assert_eq!(value["handled"], "ResetBaseline");
    }
}
