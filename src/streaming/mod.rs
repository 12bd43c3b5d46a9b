//! Audio data path: chunks, the bounded buffer, and the poll-based exporter.

pub mod chunk;
pub mod exporter;
pub mod ring_buffer;

pub use chunk::AudioChunk;
pub use exporter::{ExportedChunk, StreamExporter};
pub use ring_buffer::{RingBuffer, RingBufferStats};
