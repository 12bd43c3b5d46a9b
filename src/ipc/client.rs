//! IPC client for sending commands to the daemon.

use crate::error::{Result, TunerError};
use crate::ipc::protocol::{Command, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Send a command to the daemon via Unix socket.
///
/// # Arguments
/// * `socket_path` - Path to the Unix socket
/// * `command` - Command to send
///
/// # Returns
/// Response from daemon or error
///
/// # Errors
/// Returns `TunerError::IpcConnection` if connection fails
/// Returns `TunerError::IpcProtocol` if serialization/deserialization fails
/// or the daemon closed the connection without answering
pub async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    // Connect to daemon socket
    let stream =
        UnixStream::connect(socket_path)
            .await
            .map_err(|e| TunerError::IpcConnection {
                message: format!("Failed to connect to daemon: {}", e),
            })?;

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Serialize and send command
    let command_json = command.to_json().map_err(|e| TunerError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;

    writer
        .write_all(command_json.as_bytes())
        .await
        .map_err(|e| TunerError::IpcConnection {
            message: format!("Failed to write command: {}", e),
        })?;

    writer
        .write_all(b"\n")
        .await
        .map_err(|e| TunerError::IpcConnection {
            message: format!("Failed to write newline: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| TunerError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    // Read response
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .await
        .map_err(|e| TunerError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;

    if response_line.trim().is_empty() {
        return Err(TunerError::IpcProtocol {
            message: "Daemon closed the connection without a response".to_string(),
        });
    }

    // Deserialize response
    let response =
        Response::from_json(response_line.trim()).map_err(|e| TunerError::IpcProtocol {
            message: format!("Failed to deserialize response: {}", e),
        })?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::{CommandHandler, IpcServer};
    use tempfile::TempDir;

    struct MockHandler;

    #[async_trait::async_trait]
    impl CommandHandler for MockHandler {
        async fn handle(&self, command: Command) -> Response {
            match command {
                Command::Frequency => Response::Frequency { frequency: None },
                Command::Tune { frequency } if frequency == "200" => {
                    Response::error("Invalid frequency: out of range: 200 MHz")
                }
                Command::Tune { .. } => Response::Tuned {
                    frequency: 95.5,
                    display: "95.5 MHz".to_string(),
                    tuner_argument: "95.5M".to_string(),
                },
                _ => Response::Ok {
                    message: "Radio stream stopped".to_string(),
                },
            }
        }
    }

    async fn start_server(socket_path: std::path::PathBuf) -> tokio::task::JoinHandle<Result<()>> {
        let handle = tokio::spawn(async move {
            let server = IpcServer::new(socket_path).unwrap();
            server.start(MockHandler).await
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        handle
    }

    #[tokio::test]
    async fn test_send_command_frequency() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        let server = start_server(socket_path.clone()).await;

        let response = send_command(&socket_path, Command::Frequency).await.unwrap();
        assert_eq!(response, Response::Frequency { frequency: None });

        server.abort();
    }

    #[tokio::test]
    async fn test_send_command_tune_and_stop() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        let server = start_server(socket_path.clone()).await;

        let tuned = send_command(
            &socket_path,
            Command::Tune {
                frequency: "95.5".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(matches!(tuned, Response::Tuned { .. }));

        let stopped = send_command(&socket_path, Command::Stop).await.unwrap();
        assert_eq!(
            stopped,
            Response::Ok {
                message: "Radio stream stopped".to_string()
            }
        );

        server.abort();
    }

    #[tokio::test]
    async fn test_error_response_is_returned_not_raised() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        let server = start_server(socket_path.clone()).await;

        let response = send_command(
            &socket_path,
            Command::Tune {
                frequency: "200".to_string(),
            },
        )
        .await
        .unwrap();
        match response {
            Response::Error { message } => assert!(message.contains("out of range")),
            other => panic!("Expected Error response, got {:?}", other),
        }

        server.abort();
    }

    #[tokio::test]
    async fn test_send_command_no_daemon() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("missing.sock");

        let result = send_command(&socket_path, Command::Status).await;
        match result {
            Err(TunerError::IpcConnection { message }) => {
                assert!(message.contains("Failed to connect to daemon"))
            }
            other => panic!("Expected IpcConnection error, got {:?}", other),
        }
    }
}
