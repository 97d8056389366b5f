//! Thread management for a live scanning session.
//!
//! Two threads:
//! - `SessionRunner`: owns the `ScanSession`, processes frames one at a time
//! - `ResourceMonitorThread`: samples host resources and feeds the runner

mod monitor_thread;
mod session_runner;

pub use monitor_thread::ResourceMonitorThread;
pub use session_runner::{FrameGate, RunnerStatus, SessionRunner};
