//! Capture mode arbitration.
//!
//! [`ModeArbitrator`] owns the current [`ScanningMode`](crate::core::types::ScanningMode):
//! signal-driven switches are rate limited by a minimum dwell, failure-driven
//! fallbacks walk a fixed chain. Every switch carries a [`CaptureConfigDelta`]
//! for the platform capture session.

mod arbitrator;
mod delta;

pub use arbitrator::{
    ArbitrationConfig, ModeArbitrator, ModeChangeReason, ModeDecision, ModeWeights,
};
pub use delta::{CaptureConfigDelta, EnvironmentTexturing, FrameSemantics, MotionFilterMode};
