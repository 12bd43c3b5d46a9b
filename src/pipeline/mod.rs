//! Tuner pipeline: argv construction, capture relay and the supervisor that
//! owns the single active session.
//!
//! The supervisor runs the tuner (and optionally a player) as child processes,
//! drains audio into the ring buffer on a relay thread, and serialises tune and
//! stop behind one lock.

pub mod args;
pub mod relay;
pub mod state;
pub mod supervisor;

pub use args::{PipelineConfig, PipelineShape};
pub use relay::{CaptureRelay, RelayEnd, RelayHandle, RelayMonitor, RelayReport};
pub use state::PipelineState;
pub use supervisor::{PipelineStatus, PipelineSupervisor, StopOutcome, TuneOutcome};
