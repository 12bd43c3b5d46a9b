//! In-memory process layer for tests.
//!
//! `MockLauncher` hands out `MockProcess` handles that behave like a tuner
//! streaming audio until terminated, and keeps counts of live handles so tests
//! can check that teardown really ended every session.

use crate::error::{Result, TunerError};
use crate::process::sweep::{CommandExecutor, CommandOutput};
use crate::process::{PipelineProcess, ProcessLauncher, ProcessSpec, StdinSource};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// How a mock process named in `MockLauncher::with_behavior` acts.
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Fail `spawn` itself with this message.
    pub spawn_error: Option<String>,
    /// Exit right after spawning with this code.
    pub exit_code: Option<i32>,
    /// Stderr output, one entry per line.
    pub stderr: Vec<String>,
    /// Ignore the graceful signal (terminate still succeeds via the kill path).
    pub ignore_terminate: bool,
}

impl MockBehavior {
    /// A process that dies immediately with `code` and `stderr`.
    pub fn exits(code: i32, stderr: &str) -> Self {
        Self::default().with_exit(code).with_stderr(stderr)
    }

    /// A process whose binary cannot be started.
    pub fn spawn_fails(message: &str) -> Self {
        Self {
            spawn_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_exit(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_stderr(mut self, text: &str) -> Self {
        self.stderr = text.lines().map(str::to_string).collect();
        self
    }

    pub fn ignoring_terminate(mut self) -> Self {
        self.ignore_terminate = true;
        self
    }
}

#[derive(Debug, Default)]
struct Registry {
    behaviors: HashMap<String, MockBehavior>,
    spawned: Vec<ProcessSpec>,
    live: HashMap<String, usize>,
    peak_live: HashMap<String, usize>,
    terminated: Vec<String>,
    tee_bytes: usize,
}

/// Launcher that records spawns and counts live mock processes.
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    registry: Arc<Mutex<Registry>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the behavior of every process spawned with spec name `name`.
    pub fn with_behavior(self, name: &str, behavior: MockBehavior) -> Self {
        self.set_behavior(name, behavior);
        self
    }

    /// Change behavior for later spawns.
    pub fn set_behavior(&self, name: &str, behavior: MockBehavior) {
        self.registry().behaviors.insert(name.to_string(), behavior);
    }

    /// Specs passed to `spawn`, in order (including failed spawns).
    pub fn spawned(&self) -> Vec<ProcessSpec> {
        self.registry().spawned.clone()
    }

    /// Number of spawned processes named `name` that have not been terminated
    /// or dropped.
    pub fn live(&self, name: &str) -> usize {
        self.registry().live.get(name).copied().unwrap_or(0)
    }

    /// Total live mock processes.
    pub fn live_total(&self) -> usize {
        self.registry().live.values().sum()
    }

    /// Highest number of simultaneously live processes named `name`.
    pub fn peak_live(&self, name: &str) -> usize {
        self.registry().peak_live.get(name).copied().unwrap_or(0)
    }

    /// Names of terminated processes, in termination order.
    pub fn terminated(&self) -> Vec<String> {
        self.registry().terminated.clone()
    }

    /// Bytes written into piped stdins of mock processes.
    pub fn tee_bytes(&self) -> usize {
        self.registry().tee_bytes
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProcessLauncher for MockLauncher {
    fn spawn(&self, spec: &ProcessSpec, stdin: StdinSource) -> Result<Box<dyn PipelineProcess>> {
        let mut registry = self.registry();
        registry.spawned.push(spec.clone());
        let generation = registry.spawned.len();
        let behavior = registry
            .behaviors
            .get(&spec.name)
            .cloned()
            .unwrap_or_default();

        if let Some(message) = behavior.spawn_error.clone() {
            return Err(TunerError::Spawn {
                process: spec.name.clone(),
                message,
            });
        }

        let live = registry.live.entry(spec.name.clone()).or_insert(0);
        *live += 1;
        let live = *live;
        let peak = registry.peak_live.entry(spec.name.clone()).or_insert(0);
        *peak = (*peak).max(live);
        drop(registry);

        let alive = Arc::new(AtomicBool::new(behavior.exit_code.is_none()));
        let stdin = match stdin {
            StdinSource::Piped => Some(MockStdin {
                registry: Arc::clone(&self.registry),
            }),
            StdinSource::Null | StdinSource::Chained(_) => None,
        };

        Ok(Box::new(MockProcess {
            name: spec.name.clone(),
            pid: 10_000 + generation as u32,
            alive: Arc::clone(&alive),
            counted: true,
            stdout: Some(MockStdout {
                alive,
                // Every byte carries the spawn generation, so tests can tell
                // sessions apart in the buffer.
                pattern: vec![generation as u8; 64],
            }),
            stdin,
            unread: behavior.stderr.iter().cloned().collect(),
            behavior,
            registry: Arc::clone(&self.registry),
        }))
    }
}

/// Handle returned by `MockLauncher`.
pub struct MockProcess {
    name: String,
    pid: u32,
    alive: Arc<AtomicBool>,
    counted: bool,
    stdout: Option<MockStdout>,
    stdin: Option<MockStdin>,
    unread: VecDeque<String>,
    behavior: MockBehavior,
    registry: Arc<Mutex<Registry>>,
}

impl MockProcess {
    fn release(&mut self) {
        if !self.counted {
            return;
        }
        self.counted = false;
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(live) = registry.live.get_mut(&self.name) {
            *live = live.saturating_sub(1);
        }
        registry.terminated.push(self.name.clone());
    }
}

impl PipelineProcess for MockProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn exit_code(&self) -> Option<i32> {
        if self.alive.load(Ordering::SeqCst) {
            None
        } else {
            self.behavior.exit_code
        }
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout
            .take()
            .map(|out| Box::new(out) as Box<dyn Read + Send>)
    }

    fn take_stdout_stdio(&mut self) -> Option<Stdio> {
        self.stdout.take().map(|_| Stdio::null())
    }

    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        self.stdin
            .take()
            .map(|input| Box::new(input) as Box<dyn Write + Send>)
    }

    fn read_stderr_line(&mut self) -> Option<String> {
        self.unread.pop_front()
    }

    fn stderr_text(&mut self) -> String {
        self.behavior.stderr.join("\n")
    }

    fn terminate(&mut self, grace: Duration) {
        if self.behavior.ignore_terminate {
            // Model the escalation path: the grace period elapses first.
            thread::sleep(grace);
        }
        self.alive.store(false, Ordering::SeqCst);
        self.release();
    }
}

impl Drop for MockProcess {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.release();
    }
}

/// Endless audio source that reaches EOF once its process is terminated.
struct MockStdout {
    alive: Arc<AtomicBool>,
    pattern: Vec<u8>,
}

impl Read for MockStdout {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.alive.load(Ordering::SeqCst) {
            return Ok(0);
        }
        thread::sleep(Duration::from_millis(1));
        let n = buf.len().min(self.pattern.len());
        buf[..n].copy_from_slice(&self.pattern[..n]);
        Ok(n)
    }
}

/// Piped stdin that counts bytes written by the relay's tee.
struct MockStdin {
    registry: Arc<Mutex<Registry>>,
}

impl Write for MockStdin {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tee_bytes += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Command executor that records calls and replays queued responses.
///
/// With no queued response, commands report exit code 1 (pkill's "no match").
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    responses: Arc<Mutex<VecDeque<Result<CommandOutput>>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: Result<CommandOutput>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((
                command.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
            ));
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Ok(CommandOutput {
                    code: Some(1),
                    ..CommandOutput::default()
                })
            })
    }
}
