//! Pollable view of the ring buffer for external consumers.
//!
//! Each poll removes at most one chunk and hands it out base64-encoded, so the
//! stream can travel over a JSON transport.

use crate::defaults;
use crate::streaming::chunk::AudioChunk;
use crate::streaming::ring_buffer::RingBuffer;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Result of one poll. `chunk` is empty when nothing arrived in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedChunk {
    pub chunk: String,
    pub encoding: String,
    pub mime_type: String,
    pub sequence: Option<u64>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl ExportedChunk {
    /// True when the poll timed out without data.
    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    /// Decodes the payload back into raw PCM bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.chunk)
    }
}

/// Hands out buffered chunks to pollers.
#[derive(Debug, Clone)]
pub struct StreamExporter {
    buffer: Arc<RingBuffer>,
    sample_rate: u32,
    default_timeout: Duration,
}

impl StreamExporter {
    pub fn new(buffer: Arc<RingBuffer>, sample_rate: u32, default_timeout: Duration) -> Self {
        Self {
            buffer,
            sample_rate,
            default_timeout,
        }
    }

    /// Polls with the configured default timeout.
    pub fn poll(&self) -> ExportedChunk {
        self.poll_timeout(self.default_timeout)
    }

    /// Waits up to `timeout` for the next chunk.
    pub fn poll_timeout(&self, timeout: Duration) -> ExportedChunk {
        let chunk = self.buffer.pop(timeout);
        self.export(chunk.as_ref())
    }

    fn export(&self, chunk: Option<&AudioChunk>) -> ExportedChunk {
        ExportedChunk {
            chunk: chunk.map(|c| STANDARD.encode(&c.data)).unwrap_or_default(),
            encoding: defaults::EXPORT_ENCODING.to_string(),
            mime_type: defaults::EXPORT_MIME_TYPE.to_string(),
            sequence: chunk.map(|c| c.sequence),
            sample_rate: self.sample_rate,
            channels: defaults::CHANNELS,
        }
    }
}
