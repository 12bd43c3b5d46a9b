//! Owner of the single active capture pipeline.
//!
//! All control operations (`tune`, `stop`, `shutdown`) run under one lock held
//! across the whole teardown and spawn sequence, so a new tuner is never
//! started while processes from the previous session are still alive. Readers
//! (`current_frequency`, `status`) use a separate snapshot lock and never wait
//! on a tune in progress.

use crate::config::Config;
use crate::error::{Result, TunerError};
use crate::frequency::{self, Frequency};
use crate::pipeline::args::{PipelineConfig, PipelineShape};
use crate::pipeline::relay::{CaptureRelay, RelayHandle, RelayMonitor};
use crate::pipeline::state::PipelineState;
use crate::process::{
    self, PipelineProcess, ProcessLauncher, StdinSource, StraySweeper, SystemCommandExecutor,
    SystemLauncher,
};
use crate::streaming::exporter::StreamExporter;
use crate::streaming::ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Message returned by every successful stop.
pub const STOPPED_MESSAGE: &str = "Radio stream stopped";

/// Result of a successful `tune`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneOutcome {
    /// Frequency in MHz.
    pub frequency: f64,
    /// Human-readable frequency, e.g. "95.5 MHz".
    pub display: String,
    /// The exact `-f` value passed to the tuner, e.g. "95.5M".
    pub tuner_argument: String,
}

/// Result of `stop`. Stopping never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOutcome {
    pub message: String,
    /// Whether a pipeline was running when stop was called.
    pub was_running: bool,
    /// Buffered chunks dropped by the teardown.
    pub discarded_chunks: usize,
}

/// Point-in-time view of the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub frequency: Option<f64>,
    /// True while the capture relay is still receiving audio.
    pub stream_active: bool,
    pub chunks_captured: u64,
    pub buffered: usize,
    pub capacity: usize,
    pub evicted: u64,
    pub uptime_secs: Option<u64>,
}

#[derive(Debug, Default)]
struct Snapshot {
    state: PipelineState,
    frequency: Option<Frequency>,
    relay: Option<RelayMonitor>,
    started_at: Option<Instant>,
}

/// Processes and relay of one tuning session, in spawn order.
struct ActivePipeline {
    frequency: Frequency,
    processes: Vec<Box<dyn PipelineProcess>>,
    relay: Option<RelayHandle>,
}

impl ActivePipeline {
    fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            processes: Vec::new(),
            relay: None,
        }
    }
}

/// Starts, re-tunes and tears down the tuner pipeline.
pub struct PipelineSupervisor {
    config: PipelineConfig,
    launcher: Arc<dyn ProcessLauncher>,
    sweeper: StraySweeper,
    buffer: Arc<RingBuffer>,
    exporter: StreamExporter,
    control: Mutex<Option<ActivePipeline>>,
    snapshot: Mutex<Snapshot>,
}

impl PipelineSupervisor {
    pub fn new(
        config: PipelineConfig,
        launcher: Arc<dyn ProcessLauncher>,
        sweeper: StraySweeper,
    ) -> Self {
        let buffer = Arc::new(RingBuffer::new(config.capacity));
        let exporter =
            StreamExporter::new(Arc::clone(&buffer), config.output_rate, config.poll_timeout);
        Self {
            config,
            launcher,
            sweeper,
            buffer,
            exporter,
            control: Mutex::new(None),
            snapshot: Mutex::new(Snapshot::default()),
        }
    }

    /// Supervisor driving real processes as described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let sweeper = if config.supervisor.sweep_enabled {
            StraySweeper::new(Box::new(SystemCommandExecutor::new()), config.sweep_patterns())
        } else {
            StraySweeper::disabled()
        };
        Self::new(
            PipelineConfig::from_config(config),
            Arc::new(SystemLauncher::new()),
            sweeper,
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Tunes to `input` (e.g. "95.5", "95.5M", "95.5 MHz").
    ///
    /// Validation errors return before anything is touched. Otherwise any
    /// running pipeline is fully torn down first, the new one is spawned and
    /// probed, and on failure everything is torn down again and the supervisor
    /// is left idle.
    pub fn tune(&self, input: &str) -> Result<TuneOutcome> {
        let frequency = frequency::parse(input)?;

        let mut active = self.lock_control();
        self.teardown(active.take());

        self.publish(PipelineState::Starting, None, None);
        let mut pipeline = ActivePipeline::new(frequency);
        if let Err(e) = self.launch(&mut pipeline) {
            warn!(frequency = %frequency, "tune failed: {e}");
            self.teardown(Some(pipeline));
            return Err(e);
        }

        let monitor = pipeline.relay.as_ref().map(RelayHandle::monitor);
        self.publish(PipelineState::Running, Some(frequency), monitor);
        *active = Some(pipeline);

        info!(frequency = %frequency, "tuned");
        Ok(TuneOutcome {
            frequency: frequency.mhz(),
            display: frequency.to_string(),
            tuner_argument: frequency.tuner_argument(),
        })
    }

    /// Stops the active pipeline, if any. Safe to call repeatedly.
    pub fn stop(&self) -> StopOutcome {
        let mut active = self.lock_control();
        let pipeline = active.take();
        let was_running = pipeline.is_some();
        if let Some(pipeline) = &pipeline {
            info!(frequency = %pipeline.frequency, "stopping radio stream");
        }
        let discarded_chunks = self.teardown(pipeline);
        StopOutcome {
            message: STOPPED_MESSAGE.to_string(),
            was_running,
            discarded_chunks,
        }
    }

    /// Stop hook for process shutdown.
    pub fn shutdown(&self) -> StopOutcome {
        debug!("supervisor shutting down");
        self.stop()
    }

    /// Frequency of the running pipeline; `None` unless running.
    pub fn current_frequency(&self) -> Option<Frequency> {
        let snapshot = self.lock_snapshot();
        match snapshot.state {
            PipelineState::Running => snapshot.frequency,
            _ => None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.lock_snapshot().state
    }

    pub fn status(&self) -> PipelineStatus {
        let snapshot = self.lock_snapshot();
        let stats = self.buffer.stats();
        let running = snapshot.state == PipelineState::Running;
        PipelineStatus {
            state: snapshot.state,
            frequency: if running {
                snapshot.frequency.map(Frequency::mhz)
            } else {
                None
            },
            stream_active: running
                && snapshot
                    .relay
                    .as_ref()
                    .is_some_and(|relay| !relay.is_finished()),
            chunks_captured: snapshot.relay.as_ref().map_or(0, RelayMonitor::chunks),
            buffered: stats.len,
            capacity: stats.capacity,
            evicted: stats.evicted,
            uptime_secs: snapshot
                .started_at
                .filter(|_| running)
                .map(|at| at.elapsed().as_secs()),
        }
    }

    /// Pollable view of the captured audio.
    pub fn exporter(&self) -> &StreamExporter {
        &self.exporter
    }

    pub fn buffer(&self) -> &Arc<RingBuffer> {
        &self.buffer
    }

    /// Spawns the processes for `pipeline.frequency`, starts the relay and
    /// probes every process. Everything started is recorded in `pipeline`
    /// so the caller can tear it down on error.
    fn launch(&self, pipeline: &mut ActivePipeline) -> Result<()> {
        let shape = self.config.shape();
        let capture_spec = self.config.capture_spec(pipeline.frequency);
        info!(command = %capture_spec.command_line(), "starting capture process");

        pipeline
            .processes
            .push(self.launcher.spawn(&capture_spec, StdinSource::Null)?);

        match shape {
            PipelineShape::CaptureOnly => {
                let stdout = take_stdout(&mut pipeline.processes[0])?;
                pipeline.relay = Some(self.start_relay(&capture_spec.name, stdout, None)?);
            }
            PipelineShape::Chained => {
                let stdout = pipeline.processes[0]
                    .take_stdout_stdio()
                    .ok_or_else(|| missing_pipe(&capture_spec.name, "stdout"))?;
                let playback = self.spawn_playback(StdinSource::Chained(stdout))?;
                pipeline.processes.push(playback);
            }
            PipelineShape::Tee => {
                let stdout = take_stdout(&mut pipeline.processes[0])?;
                let mut playback = self.spawn_playback(StdinSource::Piped)?;
                let tee = playback.take_stdin();
                if tee.is_none() {
                    warn!(process = playback.name(), "no stdin pipe, playback will be silent");
                }
                pipeline.processes.push(playback);
                pipeline.relay = Some(self.start_relay(&capture_spec.name, stdout, tee)?);
            }
        }

        process::probe_liveness(
            &mut pipeline.processes,
            self.config.probe_window,
            self.config.probe_interval,
        )
    }

    fn spawn_playback(&self, stdin: StdinSource) -> Result<Box<dyn PipelineProcess>> {
        let spec = self
            .config
            .playback_spec()
            .ok_or_else(|| TunerError::Other("playback is not configured".to_string()))?;
        info!(command = %spec.command_line(), "starting playback process");
        self.launcher.spawn(&spec, stdin)
    }

    fn start_relay(
        &self,
        name: &str,
        stdout: Box<dyn Read + Send>,
        tee: Option<Box<dyn Write + Send>>,
    ) -> Result<RelayHandle> {
        CaptureRelay::start(
            name,
            stdout,
            Arc::clone(&self.buffer),
            tee,
            self.config.chunk_size,
        )
        .map_err(|e| TunerError::Spawn {
            process: format!("{name} relay"),
            message: e.to_string(),
        })
    }

    /// Full cleanup sequence. Never fails; returns the number of buffered
    /// chunks discarded.
    ///
    /// Order: stop the relay, terminate processes downstream first, join the
    /// relay, sweep strays, clear the buffer, go idle.
    fn teardown(&self, pipeline: Option<ActivePipeline>) -> usize {
        self.publish(PipelineState::Stopping, None, None);

        if let Some(mut pipeline) = pipeline {
            // A relay blocked in read only sees the flag once data or EOF
            // arrives; terminating the tuner below guarantees the EOF.
            if let Some(relay) = &pipeline.relay {
                relay.request_stop();
                if !relay.wait(self.config.relay_join_timeout) {
                    debug!("capture relay still reading, terminating processes first");
                }
            }

            for process in pipeline.processes.iter_mut().rev() {
                debug!(process = process.name(), pid = ?process.pid(), "terminating");
                process.terminate(self.config.terminate_grace);
            }

            if let Some(relay) = pipeline.relay.take()
                && let Some(report) = relay.stop(self.config.relay_join_timeout)
            {
                debug!(
                    chunks = report.chunks,
                    bytes = report.bytes,
                    ended_by = ?report.ended_by,
                    "capture relay joined"
                );
            }
        }

        self.sweeper.sweep();
        let discarded = self.buffer.clear();
        if discarded > 0 {
            debug!(discarded, "cleared audio buffer");
        }

        self.publish(PipelineState::Idle, None, None);
        discarded
    }

    fn publish(
        &self,
        state: PipelineState,
        frequency: Option<Frequency>,
        relay: Option<RelayMonitor>,
    ) {
        let mut snapshot = self.lock_snapshot();
        snapshot.state = state;
        snapshot.frequency = frequency;
        snapshot.relay = relay;
        snapshot.started_at = (state == PipelineState::Running).then(Instant::now);
    }

    fn lock_control(&self) -> MutexGuard<'_, Option<ActivePipeline>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PipelineSupervisor {
    fn drop(&mut self) {
        let active = self
            .control
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if active.is_some() {
            self.teardown(active);
        }
    }
}

impl std::fmt::Debug for PipelineSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSupervisor")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("buffer", &self.buffer)
            .finish()
    }
}

fn take_stdout(process: &mut Box<dyn PipelineProcess>) -> Result<Box<dyn Read + Send>> {
    let name = process.name().to_string();
    process
        .take_stdout()
        .ok_or_else(|| missing_pipe(&name, "stdout"))
}

fn missing_pipe(process: &str, pipe: &str) -> TunerError {
    TunerError::Spawn {
        process: process.to_string(),
        message: format!("{pipe} pipe unavailable"),
    }
}
