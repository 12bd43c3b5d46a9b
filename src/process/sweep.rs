//! Best-effort sweep of tuner and player processes left behind by a crashed run.
//!
//! The sweep matches by command-line pattern (`pkill -f`), so it can in
//! principle hit an unrelated process sharing the pattern. It runs before every
//! spawn as a safety net only; owned process groups are what teardown relies on.
//!
//! The `CommandExecutor` trait keeps the sweep testable without external tools.

use crate::error::{Result, TunerError};
use std::process::Command;
use tracing::{debug, warn};

/// Outcome of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, `None` if terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Trait for executing short-lived system commands.
///
/// Object-safe, Send + Sync for use in concurrent contexts.
pub trait CommandExecutor: Send + Sync {
    /// Run `command` with `args` to completion.
    ///
    /// Returns an error only if the command could not be started; a non-zero
    /// exit is reported through `CommandOutput::code`.
    fn execute(&self, command: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Production command executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(command).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TunerError::Other(format!("{command} not found"))
            } else {
                TunerError::Other(format!("Failed to execute {command}: {e}"))
            }
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Kills leftover processes whose command line matches one of the patterns.
pub struct StraySweeper {
    executor: Box<dyn CommandExecutor>,
    patterns: Vec<String>,
    enabled: bool,
}

impl StraySweeper {
    pub fn new(executor: Box<dyn CommandExecutor>, patterns: Vec<String>) -> Self {
        Self {
            executor,
            patterns,
            enabled: true,
        }
    }

    /// A sweeper that never runs anything.
    pub fn disabled() -> Self {
        Self {
            executor: Box::new(SystemCommandExecutor),
            patterns: Vec::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Runs `pkill -f` for every pattern. Returns how many patterns matched at
    /// least one process. Never fails; problems are logged.
    pub fn sweep(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }

        let mut matched = 0;
        for pattern in &self.patterns {
            match self.executor.execute("pkill", &["-f", pattern]) {
                Ok(CommandOutput { code: Some(0), .. }) => {
                    warn!(pattern = %pattern, "killed stray process(es) from a previous run");
                    matched += 1;
                }
                // pkill exits 1 when nothing matched.
                Ok(CommandOutput { code: Some(1), .. }) => {
                    debug!(pattern = %pattern, "no stray processes");
                }
                Ok(output) => {
                    warn!(
                        pattern = %pattern,
                        code = ?output.code,
                        "process sweep failed: {}",
                        output.stderr.trim()
                    );
                }
                Err(e) => warn!(pattern = %pattern, "process sweep unavailable: {e}"),
            }
        }
        matched
    }
}

impl std::fmt::Debug for StraySweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StraySweeper")
            .field("patterns", &self.patterns)
            .field("enabled", &self.enabled)
            .finish()
    }
}
