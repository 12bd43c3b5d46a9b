//! Real OS processes, each started in its own process group.

use crate::defaults;
use crate::error::{Result, TunerError};
use crate::process::{PipelineProcess, ProcessLauncher, ProcessSpec, StdinSource};
use crate::sys::{self, GroupSignal};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long `stderr_text` waits for a dead process's stderr pipe to reach EOF.
const STDERR_DRAIN_WAIT: Duration = Duration::from_millis(250);

/// Poll interval while waiting for a signalled group to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Launches processes with `std::process::Command`, never through a shell.
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    stderr_tail: usize,
}

impl SystemLauncher {
    pub fn new() -> Self {
        Self {
            stderr_tail: defaults::STDERR_TAIL_LINES,
        }
    }

    /// Number of stderr lines kept per process for error reports.
    pub fn with_stderr_tail(mut self, lines: usize) -> Self {
        self.stderr_tail = lines.max(1);
        self
    }
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher for SystemLauncher {
    fn spawn(&self, spec: &ProcessSpec, stdin: StdinSource) -> Result<Box<dyn PipelineProcess>> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        match stdin {
            StdinSource::Null => command.stdin(Stdio::null()),
            StdinSource::Piped => command.stdin(Stdio::piped()),
            StdinSource::Chained(upstream) => command.stdin(upstream),
        };

        let mut child = command.spawn().map_err(|e| TunerError::Spawn {
            process: spec.name.clone(),
            message: spawn_failure_message(&spec.program, &e),
        })?;

        let pid = child.id();
        debug!(process = %spec.name, pid, "spawned: {}", spec.command_line());

        let stderr = StderrLog::start(&spec.name, child.stderr.take(), self.stderr_tail);
        Ok(Box::new(SystemProcess {
            name: spec.name.clone(),
            // process_group(0) makes the child its own group leader.
            pgid: pid as i32,
            child,
            exit: None,
            terminated: false,
            stderr,
        }))
    }
}

fn spawn_failure_message(program: &str, e: &std::io::Error) -> String {
    match e.kind() {
        std::io::ErrorKind::NotFound => format!("{program} not found (is it installed and on PATH?)"),
        std::io::ErrorKind::PermissionDenied => format!("permission denied executing {program}"),
        _ => format!("failed to execute {program}: {e}"),
    }
}

/// A running child process plus its stderr drain.
pub struct SystemProcess {
    name: String,
    pgid: i32,
    child: Child,
    exit: Option<ExitStatus>,
    terminated: bool,
    stderr: StderrLog,
}

impl SystemProcess {
    fn poll_exit(&mut self) -> Option<ExitStatus> {
        if self.exit.is_none() {
            match self.child.try_wait() {
                Ok(status) => self.exit = status,
                Err(e) => {
                    warn!(process = %self.name, "failed to poll process status: {e}");
                }
            }
        }
        self.exit
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.poll_exit().is_some() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    fn signal_group(&self, signal: GroupSignal) {
        match sys::signal_process_group(self.pgid, signal) {
            Ok(true) => debug!(process = %self.name, pgid = self.pgid, ?signal, "signalled group"),
            Ok(false) => debug!(process = %self.name, pgid = self.pgid, "group already gone"),
            Err(e) => warn!(process = %self.name, pgid = self.pgid, "failed to signal group: {e}"),
        }
    }
}

impl PipelineProcess for SystemProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn is_alive(&mut self) -> bool {
        !self.terminated && self.poll_exit().is_none()
    }

    fn exit_code(&self) -> Option<i32> {
        self.exit.and_then(|status| status.code())
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|out| Box::new(out) as Box<dyn Read + Send>)
    }

    fn take_stdout_stdio(&mut self) -> Option<Stdio> {
        self.child.stdout.take().map(Stdio::from)
    }

    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        self.child
            .stdin
            .take()
            .map(|input| Box::new(input) as Box<dyn Write + Send>)
    }

    fn read_stderr_line(&mut self) -> Option<String> {
        self.stderr.next_unread()
    }

    fn stderr_text(&mut self) -> String {
        if self.poll_exit().is_some() {
            self.stderr.wait_drained(STDERR_DRAIN_WAIT);
        }
        self.stderr.text()
    }

    fn terminate(&mut self, grace: Duration) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        // Signal the group even if the leader already exited: anything it
        // forked may still hold the device.
        self.signal_group(GroupSignal::Terminate);
        if !self.wait_for_exit(grace) {
            warn!(
                process = %self.name,
                "did not exit within {:?} of SIGTERM, sending SIGKILL",
                grace
            );
            self.signal_group(GroupSignal::Kill);
        }

        // Reap. After SIGKILL this returns promptly.
        match self.child.wait() {
            Ok(status) => {
                self.exit = Some(status);
                debug!(process = %self.name, %status, "reaped");
            }
            Err(e) => warn!(process = %self.name, "failed to reap: {e}"),
        }
    }
}

impl Drop for SystemProcess {
    fn drop(&mut self) {
        self.terminate(Duration::from_millis(defaults::TERMINATE_GRACE_MS));
    }
}

#[derive(Debug, Default)]
struct StderrLines {
    tail: VecDeque<String>,
    unread: VecDeque<String>,
}

/// Drains a child's stderr on a background thread so a chatty tuner never
/// blocks on a full pipe, keeping the last few lines for error reports.
struct StderrLog {
    lines: Arc<Mutex<StderrLines>>,
    done_rx: Option<Receiver<()>>,
}

impl StderrLog {
    fn start(name: &str, stderr: Option<ChildStderr>, max_lines: usize) -> Self {
        let lines = Arc::new(Mutex::new(StderrLines::default()));
        let Some(stderr) = stderr else {
            return Self {
                lines,
                done_rx: None,
            };
        };

        // The sender is dropped when the drain thread exits; receivers then
        // observe a disconnect.
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let shared = Arc::clone(&lines);
        let process = name.to_string();
        let spawned = thread::Builder::new()
            .name(format!("{name}-stderr"))
            .spawn(move || {
                let _done = done_tx;
                let mut reader = BufReader::new(stderr);
                let mut raw = Vec::new();
                loop {
                    raw.clear();
                    match reader.read_until(b'\n', &mut raw) {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                            if line.is_empty() {
                                continue;
                            }
                            debug!(process = %process, stderr = %line);
                            let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
                            push_bounded(&mut guard.tail, line.clone(), max_lines);
                            push_bounded(&mut guard.unread, line, max_lines);
                        }
                        Err(e) => {
                            debug!(process = %process, "stderr read ended: {e}");
                            break;
                        }
                    }
                }
            });

        match spawned {
            Ok(_) => Self {
                lines,
                done_rx: Some(done_rx),
            },
            Err(e) => {
                warn!(process = %name, "failed to start stderr drain: {e}");
                Self {
                    lines,
                    done_rx: None,
                }
            }
        }
    }

    fn next_unread(&self) -> Option<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unread
            .pop_front()
    }

    fn wait_drained(&self, timeout: Duration) {
        if let Some(rx) = &self.done_rx
            && let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(timeout)
        {
            debug!("stderr still open after {:?}", timeout);
        }
    }

    fn text(&self) -> String {
        let guard = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        guard.tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

fn push_bounded(queue: &mut VecDeque<String>, line: String, max: usize) {
    if queue.len() >= max {
        queue.pop_front();
    }
    queue.push_back(line);
}
