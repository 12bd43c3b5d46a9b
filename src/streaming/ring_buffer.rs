//! Bounded chunk buffer with drop-oldest backpressure.
//!
//! The capture relay pushes without ever blocking; when the buffer is full the
//! oldest chunk is evicted to make room. Pollers block on `pop` for at most
//! their own timeout.

use crate::streaming::chunk::AudioChunk;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters describing buffer traffic since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingBufferStats {
    /// Chunks currently held.
    pub len: usize,
    /// Maximum number of chunks held.
    pub capacity: usize,
    /// Chunks accepted by `push`.
    pub pushed: u64,
    /// Chunks evicted because the buffer was full.
    pub evicted: u64,
}

/// Thread-safe bounded FIFO of audio chunks.
pub struct RingBuffer {
    tx: Sender<AudioChunk>,
    rx: Receiver<AudioChunk>,
    capacity: usize,
    pushed: AtomicU64,
    evicted: AtomicU64,
}

impl RingBuffer {
    /// Creates an empty buffer holding at most `capacity` chunks.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            pushed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Appends a chunk, evicting the oldest one first if the buffer is full.
    ///
    /// Never blocks.
    pub fn push(&self, chunk: AudioChunk) {
        let mut chunk = chunk;
        loop {
            match self.tx.try_send(chunk) {
                Ok(()) => {
                    self.pushed.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(TrySendError::Full(rejected)) => {
                    // A concurrent consumer may have emptied a slot already;
                    // either way the next try_send has room to compete for.
                    if self.rx.try_recv().is_ok() {
                        self.evicted.fetch_add(1, Ordering::Relaxed);
                    }
                    chunk = rejected;
                }
                // Both ends live in `self`, so the channel cannot disconnect.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Removes the oldest chunk, waiting up to `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> Option<AudioChunk> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Some(chunk),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Removes the oldest chunk if one is available.
    pub fn try_pop(&self) -> Option<AudioChunk> {
        match self.rx.try_recv() {
            Ok(chunk) => Some(chunk),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drops every buffered chunk and returns how many were dropped.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            len: self.len(),
            capacity: self.capacity,
            pushed: self.pushed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
