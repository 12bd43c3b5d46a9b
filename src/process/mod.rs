//! External process layer: spawning, liveness probing and termination.
//!
//! `ProcessLauncher` and `PipelineProcess` are the seam between the supervisor
//! and the OS. `system` talks to real processes; `mock` counts live handles
//! for tests.

pub mod mock;
pub mod sweep;
pub mod system;

use crate::defaults;
use crate::error::{Result, TunerError};
use std::io::{Read, Write};
use std::process::Stdio;
use std::thread;
use std::time::{Duration, Instant};

pub use sweep::{CommandExecutor, CommandOutput, StraySweeper, SystemCommandExecutor};
pub use system::{SystemLauncher, SystemProcess};

/// What to run: a display name, the program, and its argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Short name used in logs and error messages (e.g. "rtl_fm").
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }

    /// Human-readable command line for logging. Never executed by a shell.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Where a new process reads its standard input from.
#[derive(Debug)]
pub enum StdinSource {
    /// `/dev/null`; the process opens its own source (the tuner device).
    Null,
    /// A pipe the caller writes into (see `PipelineProcess::take_stdin`).
    Piped,
    /// The standard output of an upstream process.
    Chained(Stdio),
}

/// One running external process owned by the supervisor.
pub trait PipelineProcess: Send {
    /// Short name from the spawning `ProcessSpec`.
    fn name(&self) -> &str;

    /// OS process id, if the process was actually started.
    fn pid(&self) -> Option<u32>;

    /// Non-blocking health check. Records the exit status once the process
    /// has exited.
    fn is_alive(&mut self) -> bool;

    /// Exit code, once the process has exited normally.
    fn exit_code(&self) -> Option<i32>;

    /// Takes the stdout pipe for reading (capture relay).
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Takes the stdout pipe for chaining into a downstream process.
    fn take_stdout_stdio(&mut self) -> Option<Stdio>;

    /// Takes the stdin pipe of a process spawned with `StdinSource::Piped`.
    fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>>;

    /// Next stderr line not yet read through this method, without blocking.
    fn read_stderr_line(&mut self) -> Option<String>;

    /// Retained stderr output, waiting briefly for the pipe to drain when the
    /// process has already exited.
    fn stderr_text(&mut self) -> String;

    /// Terminates the process group: graceful signal, then a forced kill after
    /// `grace`. Idempotent.
    fn terminate(&mut self, grace: Duration);
}

/// Starts external processes.
pub trait ProcessLauncher: Send + Sync {
    fn spawn(&self, spec: &ProcessSpec, stdin: StdinSource) -> Result<Box<dyn PipelineProcess>>;
}

/// Watches freshly spawned processes for `window`, failing on the first one
/// (in spawn order) that exits.
///
/// Stderr output from processes that stay alive is informational and only
/// logged.
pub fn probe_liveness(
    processes: &mut [Box<dyn PipelineProcess>],
    window: Duration,
    interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + window;
    loop {
        for process in processes.iter_mut() {
            while let Some(line) = process.read_stderr_line() {
                tracing::info!(process = process.name(), "{}", line);
            }
            if !process.is_alive() {
                return Err(early_exit(process.as_mut()));
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep(interval.min(deadline - now));
    }
}

fn early_exit(process: &mut dyn PipelineProcess) -> TunerError {
    let stderr = process.stderr_text();
    let message = match stderr.trim() {
        "" => defaults::UNKNOWN_ERROR.to_string(),
        text => text.to_string(),
    };
    TunerError::EarlyExit {
        process: process.name().to_string(),
        message,
        exit_code: process.exit_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockBehavior, MockLauncher};
    use super::*;

    fn spec(name: &str) -> ProcessSpec {
        ProcessSpec::new(name, name, vec![])
    }

    #[test]
    fn test_command_line_joins_argv() {
        let spec = ProcessSpec::new(
            "rtl_fm",
            "/usr/bin/rtl_fm",
            vec!["-f".to_string(), "95.5M".to_string(), "-".to_string()],
        );
        assert_eq!(spec.command_line(), "/usr/bin/rtl_fm -f 95.5M -");
    }

    #[test]
    fn test_probe_passes_for_live_processes() {
        let launcher = MockLauncher::new();
        let mut processes = vec![launcher.spawn(&spec("a"), StdinSource::Null).unwrap()];
        let result = probe_liveness(
            &mut processes,
            Duration::from_millis(30),
            Duration::from_millis(5),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_probe_reports_stderr_of_first_dead_process() {
        let launcher = MockLauncher::new()
            .with_behavior("a", MockBehavior::exits(1, "device not found"))
            .with_behavior("b", MockBehavior::exits(2, "playback broken"));
        let mut processes = vec![
            launcher.spawn(&spec("a"), StdinSource::Null).unwrap(),
            launcher.spawn(&spec("b"), StdinSource::Null).unwrap(),
        ];
        let err = probe_liveness(
            &mut processes,
            Duration::from_millis(30),
            Duration::from_millis(5),
        )
        .unwrap_err();
        match err {
            TunerError::EarlyExit {
                process,
                message,
                exit_code,
            } => {
                assert_eq!(process, "a");
                assert_eq!(message, "device not found");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("expected EarlyExit, got {other:?}"),
        }
    }

    #[test]
    fn test_probe_falls_back_to_unknown_error() {
        let launcher = MockLauncher::new().with_behavior("a", MockBehavior::exits(1, ""));
        let mut processes = vec![launcher.spawn(&spec("a"), StdinSource::Null).unwrap()];
        let err = probe_liveness(
            &mut processes,
            Duration::from_millis(30),
            Duration::from_millis(5),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown error"), "got: {err}");
    }

    #[test]
    fn test_probe_tolerates_informational_stderr() {
        let launcher = MockLauncher::new().with_behavior(
            "a",
            MockBehavior::default().with_stderr("Found 1 device(s)\nTuned to 95500000 Hz."),
        );
        let mut processes = vec![launcher.spawn(&spec("a"), StdinSource::Null).unwrap()];
        assert!(
            probe_liveness(
                &mut processes,
                Duration::from_millis(30),
                Duration::from_millis(5)
            )
            .is_ok()
        );
    }
}
