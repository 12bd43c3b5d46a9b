//! Daemon mode for tunerd - owns the pipeline supervisor and the IPC server.

pub mod handler;

use crate::config::Config;
use crate::error::{Result, TunerError};
use crate::ipc::server::IpcServer;
use crate::pipeline::supervisor::PipelineSupervisor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Daemon state: the supervisor and the shutdown trigger.
pub struct DaemonState {
    /// The single pipeline supervisor; its methods block and run on the
    /// blocking pool.
    pub supervisor: Arc<PipelineSupervisor>,
    /// Notified by the `shutdown` command.
    pub shutdown: Arc<Notify>,
}

impl DaemonState {
    pub fn new(supervisor: PipelineSupervisor) -> Self {
        Self::from_shared(Arc::new(supervisor))
    }

    pub fn from_shared(supervisor: Arc<PipelineSupervisor>) -> Self {
        Self {
            supervisor,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Returns true if a pipeline is running.
    pub fn is_running(&self) -> bool {
        self.supervisor.current_frequency().is_some()
    }
}

/// Run the daemon with real processes described by `config`.
///
/// # Returns
/// Ok(()) on graceful shutdown, error otherwise
pub async fn run_daemon(config: Config, socket_path: Option<PathBuf>) -> Result<()> {
    config.validate()?;
    let supervisor = PipelineSupervisor::from_config(&config);
    run_with_supervisor(DaemonState::new(supervisor), socket_path).await
}

/// Serve IPC for `state` until SIGINT, SIGTERM or a `shutdown` command,
/// then stop the pipeline and remove the socket.
pub async fn run_with_supervisor(state: DaemonState, socket_path: Option<PathBuf>) -> Result<()> {
    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path)?);

    let supervisor = Arc::clone(&state.supervisor);
    let shutdown = Arc::clone(&state.shutdown);
    let handler = Arc::new(handler::DaemonCommandHandler::new(state));

    let server_clone = Arc::clone(&server);
    let mut server_handle = tokio::spawn(async move { server_clone.start_shared(handler).await });

    info!(socket = %server.socket_path().display(), "daemon ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                warn!("Error setting up signal handler: {}", e);
            }
            info!("received SIGTERM, shutting down");
        }
        _ = shutdown.notified() => {
            info!("shutdown requested over IPC");
        }
        res = &mut server_handle => {
            // The server only returns early when it could not bind or accept.
            stop_supervisor(supervisor).await;
            return match res {
                Ok(result) => result,
                Err(e) => Err(TunerError::Other(format!("daemon server task failed: {e}"))),
            };
        }
    }

    stop_supervisor(supervisor).await;
    server.stop().await?;

    if let Err(e) = server_handle.await {
        warn!("daemon server task failed: {e}");
    }

    info!("daemon stopped");
    Ok(())
}

async fn stop_supervisor(supervisor: Arc<PipelineSupervisor>) {
    if let Err(e) = tokio::task::spawn_blocking(move || supervisor.shutdown()).await {
        warn!("pipeline shutdown task failed: {e}");
    }
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| TunerError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::client::send_command;
    use crate::ipc::protocol::{Command, Response};
    use crate::pipeline::args::PipelineConfig;
    use crate::process::StraySweeper;
    use crate::process::mock::MockLauncher;
    use std::time::Duration;
    use tempfile::TempDir;

    fn mock_state(launcher: &MockLauncher) -> DaemonState {
        let mut config = PipelineConfig::default();
        config.probe_window = Duration::from_millis(20);
        config.terminate_grace = Duration::ZERO;
        DaemonState::new(PipelineSupervisor::new(
            config,
            Arc::new(launcher.clone()),
            StraySweeper::disabled(),
        ))
    }

    #[tokio::test]
    async fn test_daemon_state_not_running_initially() {
        let state = mock_state(&MockLauncher::new());
        assert!(!state.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_command_stops_pipeline_and_removes_socket() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("tunerd.sock");
        let launcher = MockLauncher::new();

        let daemon = tokio::spawn(run_with_supervisor(
            mock_state(&launcher),
            Some(socket_path.clone()),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let tuned = send_command(
            &socket_path,
            Command::Tune {
                frequency: "95.5".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(matches!(tuned, Response::Tuned { .. }), "got {tuned:?}");
        assert_eq!(launcher.live("rtl_fm"), 1);

        let response = send_command(&socket_path, Command::Shutdown).await.unwrap();
        assert!(matches!(response, Response::Ok { .. }));

        let result = tokio::time::timeout(Duration::from_secs(5), daemon)
            .await
            .expect("daemon should exit after shutdown")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(launcher.live_total(), 0);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_run_daemon_rejects_invalid_config() {
        let mut config = Config::default();
        config.stream.capacity = 0;
        let result = run_daemon(config, None).await;
        assert!(matches!(
            result,
            Err(TunerError::ConfigInvalidValue { .. })
        ));
    }
}
