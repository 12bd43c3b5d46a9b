//! tunerd - FM tuner pipeline supervisor
//!
//! Runs an SDR tuner (rtl_fm) and an optional player (SoX `play`) as child
//! processes, re-tunes on request, and exposes the live audio as a bounded,
//! pollable chunk stream.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod daemon;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod error;
pub mod frequency;
pub mod ipc;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod streaming;
pub mod sys;
#[cfg(feature = "cli")]
pub mod systemd;

// Supervisor and its seams
pub use pipeline::supervisor::{PipelineStatus, PipelineSupervisor, StopOutcome, TuneOutcome};
pub use process::{CommandExecutor, PipelineProcess, ProcessLauncher, SystemCommandExecutor};

// Streaming
pub use streaming::{ExportedChunk, RingBuffer, StreamExporter};

// Error handling
pub use error::{Result, TunerError};

// Config
pub use config::Config;

pub use frequency::{Frequency, FrequencyError};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(
                hash_part.len(),
                7,
                "Git hash should be 7 chars, got: {}",
                hash_part
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
