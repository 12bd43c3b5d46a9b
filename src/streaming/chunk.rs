//! Audio chunk type shared by the capture relay, ring buffer and exporter.

use std::time::Instant;

/// One read unit of raw audio bytes from the tuner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Sequence number assigned by the relay, starting at 0 per pipeline.
    pub sequence: u64,
    /// Time the bytes were read from the tuner.
    pub captured_at: Instant,
    /// Raw signed 16-bit little-endian PCM.
    pub data: Vec<u8>,
}

impl AudioChunk {
    /// Creates a chunk by copying `data`.
    pub fn new(sequence: u64, data: &[u8]) -> Self {
        Self {
            sequence,
            captured_at: Instant::now(),
            data: data.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback duration in milliseconds for mono s16 audio at `sample_rate`.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        if sample_rate == 0 {
            return 0;
        }
        ((self.data.len() / 2) as u64 * 1000 / sample_rate as u64) as u32
    }
}
