use crate::defaults;
use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub tuner: TunerConfig,
    pub playback: PlaybackConfig,
    pub stream: StreamConfig,
    pub supervisor: SupervisorConfig,
}

/// Capture process (rtl_fm) configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TunerConfig {
    pub binary: String,
    pub sample_rate: u32,
    pub output_rate: u32,
    pub squelch: u32,
    /// Passed as `-A <mode>` when set (e.g. "fast").
    pub agc_mode: Option<String>,
    /// Passed as `-g <gain>` when set. Omitted means automatic gain.
    pub gain: Option<f32>,
    /// Passed as `-b <size>` when set.
    pub buffer_size: Option<u32>,
}

/// Playback process (SoX `play`) configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub enabled: bool,
    pub binary: String,
}

/// Pollable audio stream configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub export_enabled: bool,
    pub chunk_size: usize,
    pub capacity: usize,
    pub poll_timeout_ms: u64,
}

/// Supervisor timing and cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    pub probe_window_ms: u64,
    pub terminate_grace_ms: u64,
    pub relay_join_timeout_ms: u64,
    /// Kill leftover tuner/player processes by name before each spawn.
    pub sweep_enabled: bool,
    /// `pkill -f` patterns. Empty means the configured binary names.
    pub sweep_patterns: Vec<String>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            binary: defaults::TUNER_BINARY.to_string(),
            sample_rate: defaults::SAMPLE_RATE,
            output_rate: defaults::OUTPUT_RATE,
            squelch: defaults::SQUELCH,
            agc_mode: None,
            gain: None,
            buffer_size: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: defaults::PLAYBACK_BINARY.to_string(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            export_enabled: true,
            chunk_size: defaults::CHUNK_SIZE,
            capacity: defaults::BUFFER_CAPACITY,
            poll_timeout_ms: defaults::POLL_TIMEOUT_MS,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_window_ms: defaults::PROBE_WINDOW_MS,
            terminate_grace_ms: defaults::TERMINATE_GRACE_MS,
            relay_join_timeout_ms: defaults::RELAY_JOIN_TIMEOUT_MS,
            sweep_enabled: true,
            sweep_patterns: Vec::new(),
        }
    }
}

impl StreamConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl SupervisorConfig {
    pub fn probe_window(&self) -> Duration {
        Duration::from_millis(self.probe_window_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn relay_join_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_join_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - TUNERD_TUNER_BINARY → tuner.binary
    /// - TUNERD_PLAYBACK_BINARY → playback.binary
    /// - TUNERD_GAIN → tuner.gain (ignored unless numeric)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(binary) = std::env::var("TUNERD_TUNER_BINARY")
            && !binary.is_empty()
        {
            self.tuner.binary = binary;
        }

        if let Ok(binary) = std::env::var("TUNERD_PLAYBACK_BINARY")
            && !binary.is_empty()
        {
            self.playback.binary = binary;
        }

        if let Ok(gain) = std::env::var("TUNERD_GAIN")
            && let Ok(gain) = gain.trim().parse::<f32>()
        {
            self.tuner.gain = Some(gain);
        }

        self
    }

    /// Reject values the supervisor cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> TunerError {
            TunerError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        if self.tuner.binary.trim().is_empty() {
            return Err(invalid("tuner.binary", "must not be empty"));
        }
        if self.tuner.sample_rate == 0 {
            return Err(invalid("tuner.sample_rate", "must be positive"));
        }
        if self.tuner.output_rate == 0 {
            return Err(invalid("tuner.output_rate", "must be positive"));
        }
        if let Some(gain) = self.tuner.gain
            && !gain.is_finite()
        {
            return Err(invalid("tuner.gain", "must be a finite number"));
        }
        if self.playback.enabled && self.playback.binary.trim().is_empty() {
            return Err(invalid("playback.binary", "must not be empty"));
        }
        if self.stream.chunk_size == 0 {
            return Err(invalid("stream.chunk_size", "must be positive"));
        }
        if self.stream.capacity == 0 {
            return Err(invalid("stream.capacity", "must be positive"));
        }
        if !self.playback.enabled && !self.stream.export_enabled {
            return Err(invalid(
                "stream.export_enabled",
                "audio has nowhere to go with playback disabled",
            ));
        }
        Ok(())
    }

    /// Patterns for the stray-process sweep.
    pub fn sweep_patterns(&self) -> Vec<String> {
        if !self.supervisor.sweep_patterns.is_empty() {
            return self.supervisor.sweep_patterns.clone();
        }
        let mut patterns = vec![binary_name(&self.tuner.binary)];
        if self.playback.enabled {
            patterns.push(binary_name(&self.playback.binary));
        }
        patterns
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/tunerd/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tunerd").join("config.toml"))
    }
}

/// File name of a binary path, used as its process name.
pub(crate) fn binary_name(binary: &str) -> String {
    Path::new(binary)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| binary.to_string())
}

/// Resolve a config path argument, falling back to the default location.
#[cfg(feature = "cli")]
pub fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
    path.map(Path::to_path_buf).or_else(Config::default_path)
}
