//! Command lines for the capture and playback processes.

use crate::config::{Config, binary_name};
use crate::defaults;
use crate::frequency::Frequency;
use crate::process::ProcessSpec;
use std::time::Duration;

/// Which processes run and where the audio goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineShape {
    /// Tuner only; audio goes to the ring buffer.
    CaptureOnly,
    /// Tuner stdout chained straight into the player's stdin.
    Chained,
    /// Tuner feeds the relay, which tees every chunk into the player.
    Tee,
}

impl PipelineShape {
    pub fn has_playback(self) -> bool {
        !matches!(self, PipelineShape::CaptureOnly)
    }

    pub fn has_relay(self) -> bool {
        !matches!(self, PipelineShape::Chained)
    }
}

/// Everything the supervisor needs from the configuration, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub tuner_binary: String,
    pub sample_rate: u32,
    pub output_rate: u32,
    pub squelch: u32,
    pub agc_mode: Option<String>,
    pub gain: Option<f32>,
    pub buffer_size: Option<u32>,
    pub playback_binary: Option<String>,
    pub export_enabled: bool,
    pub chunk_size: usize,
    pub capacity: usize,
    pub poll_timeout: Duration,
    pub probe_window: Duration,
    pub probe_interval: Duration,
    pub terminate_grace: Duration,
    pub relay_join_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tuner_binary: config.tuner.binary.clone(),
            sample_rate: config.tuner.sample_rate,
            output_rate: config.tuner.output_rate,
            squelch: config.tuner.squelch,
            agc_mode: config.tuner.agc_mode.clone(),
            gain: config.tuner.gain,
            buffer_size: config.tuner.buffer_size,
            playback_binary: config
                .playback
                .enabled
                .then(|| config.playback.binary.clone()),
            export_enabled: config.stream.export_enabled,
            chunk_size: config.stream.chunk_size,
            capacity: config.stream.capacity,
            poll_timeout: config.stream.poll_timeout(),
            probe_window: config.supervisor.probe_window(),
            probe_interval: Duration::from_millis(defaults::PROBE_INTERVAL_MS),
            terminate_grace: config.supervisor.terminate_grace(),
            relay_join_timeout: config.supervisor.relay_join_timeout(),
        }
    }

    pub fn shape(&self) -> PipelineShape {
        match (self.playback_binary.is_some(), self.export_enabled) {
            (false, _) => PipelineShape::CaptureOnly,
            (true, false) => PipelineShape::Chained,
            (true, true) => PipelineShape::Tee,
        }
    }

    /// Tuner argv: `-f <freq>M -s <rate> -r <rate> -l <squelch> [...] -`.
    pub fn capture_spec(&self, frequency: Frequency) -> ProcessSpec {
        let mut args = vec![
            "-f".to_string(),
            frequency.tuner_argument(),
            "-s".to_string(),
            self.sample_rate.to_string(),
            "-r".to_string(),
            self.output_rate.to_string(),
            "-l".to_string(),
            self.squelch.to_string(),
        ];
        if let Some(mode) = &self.agc_mode {
            args.extend(["-A".to_string(), mode.clone()]);
        }
        if let Some(gain) = self.gain {
            args.extend(["-g".to_string(), gain.to_string()]);
        }
        if let Some(size) = self.buffer_size {
            args.extend(["-b".to_string(), size.to_string()]);
        }
        args.push("-".to_string());

        ProcessSpec::new(
            binary_name(&self.tuner_binary),
            self.tuner_binary.clone(),
            args,
        )
    }

    /// Player argv reading signed 16-bit mono PCM at the tuner's output rate.
    pub fn playback_spec(&self) -> Option<ProcessSpec> {
        let binary = self.playback_binary.as_ref()?;
        let args = vec![
            "-t".to_string(),
            "s16".to_string(),
            "-r".to_string(),
            self.output_rate.to_string(),
            "-e".to_string(),
            "signed".to_string(),
            "-b".to_string(),
            "16".to_string(),
            "-c".to_string(),
            defaults::CHANNELS.to_string(),
            "-".to_string(),
        ];
        Some(ProcessSpec::new(binary_name(binary), binary.clone(), args))
    }
}
