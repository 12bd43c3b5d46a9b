//! Default configuration constants for tunerd.
//!
//! Shared by the configuration types and the supervisor so that capture and
//! playback parameters stay consistent with each other.

/// Default tuner binary.
pub const TUNER_BINARY: &str = "rtl_fm";

/// Default playback binary (SoX).
pub const PLAYBACK_BINARY: &str = "play";

/// Tuner input sample rate in Hz (`-s`).
pub const SAMPLE_RATE: u32 = 240_000;

/// Demodulated output rate in Hz (`-r`), also the playback input rate.
pub const OUTPUT_RATE: u32 = 48_000;

/// Squelch level (`-l`).
pub const SQUELCH: u32 = 30;

/// Output is signed 16-bit mono PCM.
pub const CHANNELS: u16 = 1;

/// Bytes read from the tuner per chunk.
pub const CHUNK_SIZE: usize = 4096;

/// Number of chunks retained for pollers before the oldest is evicted.
///
/// At 48 kHz mono s16 a 4 KiB chunk is ~43 ms, so 10000 chunks hold roughly
/// seven minutes of audio.
pub const BUFFER_CAPACITY: usize = 10_000;

/// How long a single audio poll waits for a chunk.
pub const POLL_TIMEOUT_MS: u64 = 100;

/// How long a freshly spawned process must stay alive to count as started.
pub const PROBE_WINDOW_MS: u64 = 1000;

/// Interval between liveness checks during the probe window.
pub const PROBE_INTERVAL_MS: u64 = 50;

/// Grace period between SIGTERM and SIGKILL.
pub const TERMINATE_GRACE_MS: u64 = 2000;

/// How long teardown waits for the capture relay to notice its stop flag.
pub const RELAY_JOIN_TIMEOUT_MS: u64 = 500;

/// Number of stderr lines retained per process.
pub const STDERR_TAIL_LINES: usize = 64;

/// Reason reported when a process died without writing anything to stderr.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// MIME type advertised for exported chunks.
pub const EXPORT_MIME_TYPE: &str = "audio/raw";

/// Encoding advertised for exported chunks.
pub const EXPORT_ENCODING: &str = "base64";

/// Upper bound on the timeout a remote poller may request.
pub const MAX_POLL_TIMEOUT_MS: u64 = 5000;
