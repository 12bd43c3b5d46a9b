//! Command-line interface for tunerd
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// FM tuner pipeline daemon
#[derive(Parser, Debug)]
#[command(name = "tunerd", version, about = "FM tuner pipeline daemon")]
pub struct Cli {
    /// Subcommand to execute (default: status)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug logs, -vv: trace logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime` (`500ms`, `2s`,
/// `1m30s`); a bare number is taken as milliseconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon (foreground process for systemd)
    Daemon {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/tunerd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Tune to a frequency in MHz (e.g. 95.5, 95.5M, "95.5 MHz")
    Tune {
        /// Frequency between 87.5 and 108.0 MHz
        frequency: String,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/tunerd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Stop the radio stream
    Stop {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/tunerd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Print the current frequency
    Frequency {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/tunerd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Get daemon status
    Status {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/tunerd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Write raw audio chunks from the daemon to stdout
    /// (e.g. `tunerd listen | play -t s16 -r 48000 -e signed -b 16 -c 1 -`)
    Listen {
        /// Stop after this many chunks (default: run until interrupted)
        #[arg(long, short = 'n', value_name = "N")]
        count: Option<u64>,

        /// How long each poll waits for audio. Examples: 500ms, 2s
        #[arg(long, short = 't', value_name = "DURATION", default_value = "1s", value_parser = parse_duration)]
        timeout: Duration,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/tunerd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Stop the stream and shut the daemon down
    Shutdown {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/tunerd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Check system dependencies
    Check,

    /// Install systemd user service
    InstallService,

    /// Stop and remove the systemd user service
    UninstallService,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}
