//! Capture relay: drains the tuner's stdout into the ring buffer.
//!
//! Runs on a dedicated thread until end of stream, a stop request, or an I/O
//! error. Errors never propagate to the caller; they end the stream and are
//! logged. The supervisor's own health checks are the authoritative failure
//! signal.

use crate::streaming::chunk::AudioChunk;
use crate::streaming::ring_buffer::RingBuffer;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Why the relay loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// The tuner closed its stdout (usually because it exited).
    EndOfStream,
    /// `RelayHandle::request_stop` was observed.
    Stopped,
    /// Reading failed; the message is the I/O error.
    ReadError(String),
}

/// Summary returned when the relay thread is joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub chunks: u64,
    pub bytes: u64,
    pub ended_by: RelayEnd,
}

/// Cheap, cloneable view of a running relay for status reporting.
#[derive(Debug, Clone)]
pub struct RelayMonitor {
    finished: Arc<AtomicBool>,
    chunks: Arc<AtomicU64>,
}

impl RelayMonitor {
    /// True once the relay thread has left its loop.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Chunks pushed so far.
    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }
}

/// Starts capture relays.
pub struct CaptureRelay;

impl CaptureRelay {
    /// Spawns the relay thread reading `source` in `chunk_size` pieces.
    ///
    /// When `tee` is given, every chunk is also written to it (the playback
    /// process's stdin). A broken tee stops teeing but not buffering.
    pub fn start(
        name: &str,
        source: Box<dyn Read + Send>,
        sink: Arc<RingBuffer>,
        tee: Option<Box<dyn Write + Send>>,
        chunk_size: usize,
    ) -> std::io::Result<RelayHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let chunks = Arc::new(AtomicU64::new(0));
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);

        let worker = RelayWorker {
            process: name.to_string(),
            source,
            sink,
            tee,
            chunk_size: chunk_size.max(1),
            stop: Arc::clone(&stop),
            chunks: Arc::clone(&chunks),
        };
        let finished_flag = Arc::clone(&finished);

        let thread = thread::Builder::new()
            .name(format!("{name}-relay"))
            .spawn(move || {
                // Dropped on exit, which disconnects `done_rx`.
                let _done = done_tx;
                let report = worker.run();
                finished_flag.store(true, Ordering::SeqCst);
                report
            })?;

        Ok(RelayHandle {
            stop,
            monitor: RelayMonitor { finished, chunks },
            done_rx,
            thread: Some(thread),
        })
    }
}

struct RelayWorker {
    process: String,
    source: Box<dyn Read + Send>,
    sink: Arc<RingBuffer>,
    tee: Option<Box<dyn Write + Send>>,
    chunk_size: usize,
    stop: Arc<AtomicBool>,
    chunks: Arc<AtomicU64>,
}

impl RelayWorker {
    fn run(mut self) -> RelayReport {
        let mut buf = vec![0u8; self.chunk_size];
        let mut sequence = 0u64;
        let mut bytes = 0u64;

        let ended_by = loop {
            if self.stop.load(Ordering::SeqCst) {
                break RelayEnd::Stopped;
            }
            match self.source.read(&mut buf) {
                Ok(0) => break RelayEnd::EndOfStream,
                Ok(n) => {
                    // A stop may have been requested while blocked in read.
                    if self.stop.load(Ordering::SeqCst) {
                        break RelayEnd::Stopped;
                    }
                    self.sink.push(AudioChunk::new(sequence, &buf[..n]));
                    self.write_tee(&buf[..n]);
                    sequence += 1;
                    bytes += n as u64;
                    self.chunks.store(sequence, Ordering::Relaxed);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => break RelayEnd::ReadError(e.to_string()),
            }
        };

        match &ended_by {
            RelayEnd::ReadError(message) => {
                warn!(process = %self.process, "audio capture error: {message}");
            }
            RelayEnd::EndOfStream => {
                debug!(process = %self.process, chunks = sequence, "capture stream ended");
            }
            RelayEnd::Stopped => {
                debug!(process = %self.process, chunks = sequence, "capture relay stopped");
            }
        }

        // Closing our end of the pipes here; `self` drops source and tee.
        RelayReport {
            chunks: sequence,
            bytes,
            ended_by,
        }
    }

    fn write_tee(&mut self, data: &[u8]) {
        let Some(tee) = self.tee.as_mut() else {
            return;
        };
        if let Err(e) = tee.write_all(data) {
            warn!(process = %self.process, "playback pipe closed, buffering only: {e}");
            self.tee = None;
        }
    }
}

/// Control handle for a running relay.
pub struct RelayHandle {
    stop: Arc<AtomicBool>,
    monitor: RelayMonitor,
    done_rx: Receiver<()>,
    thread: Option<JoinHandle<RelayReport>>,
}

impl RelayHandle {
    /// Asks the relay to exit after its current read.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits up to `timeout` for the relay thread to exit. Returns true if it
    /// has exited.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            Ok(()) | Err(RecvTimeoutError::Timeout) => self.monitor.is_finished(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.monitor.is_finished()
    }

    pub fn monitor(&self) -> RelayMonitor {
        self.monitor.clone()
    }

    /// Requests a stop, waits up to `timeout`, and joins the thread if it
    /// exited. Returns `None` if the thread is still blocked; it is then
    /// detached and will exit on its next read.
    pub fn stop(mut self, timeout: Duration) -> Option<RelayReport> {
        self.request_stop();
        if !self.wait(timeout) {
            warn!("capture relay did not exit within {:?}, detaching", timeout);
            return None;
        }
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(report) => Some(report),
            Err(panic_info) => {
                let msg = panic_info
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                    .unwrap_or("unknown panic");
                warn!("capture relay panicked: {msg}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Reader that blocks until released, then reports EOF.
    struct GateReader {
        release: Receiver<()>,
    }

    impl Read for GateReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.release.recv();
            Ok(0)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "pipe broke"))
        }
    }

    #[derive(Clone, Default)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "reader gone"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_relays_stream_in_chunks_until_eof() {
        let buffer = Arc::new(RingBuffer::new(16));
        let data: Vec<u8> = (0..10u8).collect();
        let relay = CaptureRelay::start(
            "test",
            Box::new(Cursor::new(data)),
            Arc::clone(&buffer),
            None,
            4,
        )
        .unwrap();

        assert!(relay.wait(Duration::from_secs(2)));
        let report = relay.stop(Duration::from_secs(1)).unwrap();
        assert_eq!(report.ended_by, RelayEnd::EndOfStream);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.bytes, 10);

        let chunks: Vec<AudioChunk> = std::iter::from_fn(|| buffer.try_pop()).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data, vec![0, 1, 2, 3]);
        assert_eq!(chunks[2].data, vec![8, 9]);
        assert_eq!(
            chunks.iter().map(|c| c.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_read_error_ends_relay_quietly() {
        let buffer = Arc::new(RingBuffer::new(4));
        let relay =
            CaptureRelay::start("test", Box::new(FailingReader), Arc::clone(&buffer), None, 4)
                .unwrap();
        let report = relay.stop(Duration::from_secs(2)).unwrap();
        assert!(matches!(report.ended_by, RelayEnd::ReadError(ref m) if m.contains("pipe broke")));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_tee_receives_same_bytes() {
        let buffer = Arc::new(RingBuffer::new(16));
        let tee = SharedWriter::default();
        let relay = CaptureRelay::start(
            "test",
            Box::new(Cursor::new(b"abcdefgh".to_vec())),
            Arc::clone(&buffer),
            Some(Box::new(tee.clone())),
            3,
        )
        .unwrap();
        relay.stop(Duration::from_secs(2)).unwrap();
        assert_eq!(tee.0.lock().unwrap().as_slice(), b"abcdefgh");
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_broken_tee_keeps_buffering() {
        let buffer = Arc::new(RingBuffer::new(16));
        let relay = CaptureRelay::start(
            "test",
            Box::new(Cursor::new(vec![7u8; 12])),
            Arc::clone(&buffer),
            Some(Box::new(BrokenWriter)),
            4,
        )
        .unwrap();
        let report = relay.stop(Duration::from_secs(2)).unwrap();
        assert_eq!(report.ended_by, RelayEnd::EndOfStream);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_blocked_relay_detaches_after_timeout_then_exits() {
        let buffer = Arc::new(RingBuffer::new(4));
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        let relay = CaptureRelay::start(
            "test",
            Box::new(GateReader {
                release: release_rx,
            }),
            Arc::clone(&buffer),
            None,
            4,
        )
        .unwrap();
        let monitor = relay.monitor();

        relay.request_stop();
        assert!(!relay.wait(Duration::from_millis(50)));
        assert!(!monitor.is_finished());

        release_tx.send(()).unwrap();
        assert!(relay.wait(Duration::from_secs(2)));
        assert!(monitor.is_finished());
        assert_eq!(monitor.chunks(), 0);
    }
}
