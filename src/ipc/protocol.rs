//! JSON message protocol for IPC communication between CLI and daemon.

use crate::pipeline::state::PipelineState;
use crate::pipeline::supervisor::{PipelineStatus, StopOutcome, TuneOutcome};
use crate::streaming::exporter::ExportedChunk;
use serde::{Deserialize, Serialize};

/// Commands sent by CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Tune to a frequency expression such as "95.5" or "95.5 MHz"
    Tune { frequency: String },
    /// Stop the radio stream
    Stop,
    /// Get the current frequency
    Frequency,
    /// Get daemon status
    Status,
    /// Take the next buffered audio chunk
    PollAudio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Stop the stream and shut down the daemon
    Shutdown,
}

impl Command {
    /// Serialize command to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by daemon to CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Tune succeeded
    Tuned {
        frequency: f64,
        display: String,
        tuner_argument: String,
    },
    /// Command succeeded
    Ok { message: String },
    /// Current frequency in MHz, `None` when not running
    Frequency { frequency: Option<f64> },
    /// Current daemon status
    Status {
        state: PipelineState,
        frequency: Option<f64>,
        stream_active: bool,
        chunks_captured: u64,
        buffered: usize,
        capacity: usize,
        evicted: u64,
        uptime_secs: Option<u64>,
    },
    /// One polled audio chunk (empty `chunk` when none arrived in time)
    Audio {
        chunk: String,
        encoding: String,
        mime_type: String,
        sequence: Option<u64>,
        sample_rate: u32,
        channels: u16,
    },
    /// Error occurred
    Error { message: String },
}

impl Response {
    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

impl From<TuneOutcome> for Response {
    fn from(outcome: TuneOutcome) -> Self {
        Response::Tuned {
            frequency: outcome.frequency,
            display: outcome.display,
            tuner_argument: outcome.tuner_argument,
        }
    }
}

impl From<StopOutcome> for Response {
    fn from(outcome: StopOutcome) -> Self {
        Response::Ok {
            message: outcome.message,
        }
    }
}

impl From<PipelineStatus> for Response {
    fn from(status: PipelineStatus) -> Self {
        Response::Status {
            state: status.state,
            frequency: status.frequency,
            stream_active: status.stream_active,
            chunks_captured: status.chunks_captured,
            buffered: status.buffered,
            capacity: status.capacity,
            evicted: status.evicted,
            uptime_secs: status.uptime_secs,
        }
    }
}

impl From<ExportedChunk> for Response {
    fn from(chunk: ExportedChunk) -> Self {
        Response::Audio {
            chunk: chunk.chunk,
            encoding: chunk.encoding,
            mime_type: chunk.mime_type,
            sequence: chunk.sequence,
            sample_rate: chunk.sample_rate,
            channels: chunk.channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_all_variants_roundtrip() {
        let commands = vec![
            Command::Tune {
                frequency: "95.5 MHz".to_string(),
            },
            Command::Stop,
            Command::Frequency,
            Command::Status,
            Command::PollAudio {
                timeout_ms: Some(250),
            },
            Command::PollAudio { timeout_ms: None },
            Command::Shutdown,
        ];

        for cmd in commands {
            let json = cmd.to_json().expect("should serialize");
            let deserialized = Command::from_json(&json).expect("should deserialize");
            assert_eq!(cmd, deserialized, "roundtrip failed for {:?}", cmd);
        }
    }

    #[test]
    fn test_json_format_is_snake_case() {
        let json = Command::PollAudio { timeout_ms: None }
            .to_json()
            .expect("should serialize");
        assert_eq!(json, r#"{"type":"poll_audio"}"#);

        let json = Command::Tune {
            frequency: "101.1".to_string(),
        }
        .to_json()
        .expect("should serialize");
        assert_eq!(json, r#"{"type":"tune","frequency":"101.1"}"#);
    }

    #[test]
    fn test_poll_audio_timeout_is_optional() {
        let cmd = Command::from_json(r#"{"type":"poll_audio"}"#).expect("should deserialize");
        assert_eq!(cmd, Command::PollAudio { timeout_ms: None });
    }

    #[test]
    fn test_tuned_response_from_outcome() {
        let resp: Response = TuneOutcome {
            frequency: 95.5,
            display: "95.5 MHz".to_string(),
            tuner_argument: "95.5M".to_string(),
        }
        .into();
        let json = resp.to_json().expect("should serialize");
        assert!(json.contains("\"type\":\"tuned\""), "got: {json}");
        assert!(json.contains("\"tuner_argument\":\"95.5M\""), "got: {json}");
        assert_eq!(Response::from_json(&json).expect("should deserialize"), resp);
    }

    #[test]
    fn test_status_state_is_lowercase() {
        let resp: Response = PipelineStatus {
            state: PipelineState::Running,
            frequency: Some(101.1),
            stream_active: true,
            chunks_captured: 12,
            buffered: 3,
            capacity: 10_000,
            evicted: 0,
            uptime_secs: Some(5),
        }
        .into();
        let json = resp.to_json().expect("should serialize");
        assert!(json.contains("\"state\":\"running\""), "got: {json}");
    }

    #[test]
    fn test_frequency_response_null_when_idle() {
        let json = Response::Frequency { frequency: None }
            .to_json()
            .expect("should serialize");
        assert_eq!(json, r#"{"type":"frequency","frequency":null}"#);
    }

    #[test]
    fn test_error_response() {
        let resp = Response::error("Invalid frequency: out of range");
        let json = resp.to_json().expect("should serialize");
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("out of range"));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(Command::from_json("not json").is_err());
        assert!(Command::from_json(r#"{"type":"toggle"}"#).is_err());
    }
}
