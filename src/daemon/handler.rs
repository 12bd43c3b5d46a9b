//! Command handler implementation for the daemon.

use crate::daemon::DaemonState;
use crate::defaults;
use crate::ipc::protocol::{Command, Response};
use crate::ipc::server::CommandHandler;
use crate::pipeline::supervisor::PipelineSupervisor;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Command handler for daemon IPC commands.
pub struct DaemonCommandHandler {
    state: Arc<DaemonState>,
}

impl DaemonCommandHandler {
    /// Creates a new command handler.
    pub fn new(state: DaemonState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Runs a blocking supervisor call on the blocking pool.
    async fn blocking<F>(&self, f: F) -> Response
    where
        F: FnOnce(&PipelineSupervisor) -> Response + Send + 'static,
    {
        let supervisor = Arc::clone(&self.state.supervisor);
        match tokio::task::spawn_blocking(move || f(&supervisor)).await {
            Ok(response) => response,
            Err(e) => {
                warn!("supervisor task failed: {e}");
                Response::error(format!("Internal error: {}", e))
            }
        }
    }

    async fn tune(&self, frequency: String) -> Response {
        self.blocking(move |supervisor| match supervisor.tune(&frequency) {
            Ok(outcome) => outcome.into(),
            Err(e) => Response::error(e.to_string()),
        })
        .await
    }

    async fn stop(&self) -> Response {
        self.blocking(|supervisor| supervisor.stop().into()).await
    }

    fn frequency(&self) -> Response {
        Response::Frequency {
            frequency: self.state.supervisor.current_frequency().map(|f| f.mhz()),
        }
    }

    fn status(&self) -> Response {
        self.state.supervisor.status().into()
    }

    async fn poll_audio(&self, timeout_ms: Option<u64>) -> Response {
        let timeout = timeout_ms
            .map(|ms| Duration::from_millis(ms.min(defaults::MAX_POLL_TIMEOUT_MS)));
        self.blocking(move |supervisor| {
            let exporter = supervisor.exporter();
            let chunk = match timeout {
                Some(timeout) => exporter.poll_timeout(timeout),
                None => exporter.poll(),
            };
            chunk.into()
        })
        .await
    }

    async fn shutdown(&self) -> Response {
        let response = self.stop().await;
        self.state.shutdown.notify_one();
        match response {
            Response::Ok { .. } => Response::Ok {
                message: "Daemon shutting down".to_string(),
            },
            other => other,
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Tune { frequency } => self.tune(frequency).await,
            Command::Stop => self.stop().await,
            Command::Frequency => self.frequency(),
            Command::Status => self.status(),
            Command::PollAudio { timeout_ms } => self.poll_audio(timeout_ms).await,
            Command::Shutdown => self.shutdown().await,
        }
    }
}
