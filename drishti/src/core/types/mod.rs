//! Core data types shared by every layer.

mod conditions;
mod frame;
mod metrics;
mod mode;
mod resources;
mod state;

pub use conditions::ScanningConditions;
pub use frame::{
    CameraImage, CameraPose, DepthMap, Frame, MAX_CONFIDENCE_LEVEL, TrackingState,
};
pub use metrics::{CalibrationStatus, QualityMetrics, SignalKind};
pub use mode::ScanningMode;
pub use resources::{DeviceCapability, ResourceMetrics, ThermalState};
pub use state::{PauseReason, ScanningState, StateTransition};
