//! Frame sources.
//!
//! The platform capture session is external; this module carries the
//! [`FrameSource`] seam and a seeded synthetic source used by the binary,
//! tests and benches.

mod noise;
mod synthetic;

pub use noise::SensorNoise;
pub use synthetic::{CapturePhase, FrameSource, SyntheticConfig, SyntheticFrameSource};
