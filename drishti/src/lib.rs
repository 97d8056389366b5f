//! Drishti - adaptive scan-quality scoring and capture-mode arbitration
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              threads/  +  io/                       │  ← Runtime
//! │    (session runner, resource monitor, frame source) │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    session/                         │  ← Orchestration
//! │   (ScanSession, state machine, recovery, store)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │         adaptive/  arbitration/  resources/         │  ← Decisions
//! │  (quality controller, mode arbitrator, monitor)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │              signals/  +  quality/                  │  ← Measurement
//! │     (per-frame extractors, aggregation, thresholds) │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │          (types, ring buffer, math, clock)          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Control operations take time as explicit microseconds; only `threads/`
//! reads a clock.
//!
//! # Example
//!
//! ```ignore
//! let config = DrishtiConfig::default();
//! let mut session = ScanSession::from_config(&config)?;
//! let events = session.subscribe();
//! session.start(0)?;
//! let outcome = session.process_frame(&frame, frame.timestamp_us)?;
//! let summary = session.stop(now_us)?;
//! ```

pub mod adaptive;
pub mod arbitration;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod io;
pub mod quality;
pub mod resources;
pub mod session;
pub mod signals;
pub mod threads;

pub use adaptive::{AdaptationEvent, AdaptiveQualityController, ProcessingTier, QualitySettings};
pub use arbitration::{CaptureConfigDelta, ModeArbitrator, ModeDecision};
pub use config::DrishtiConfig;
pub use crate::core::types::{
    DeviceCapability, Frame, PauseReason, QualityMetrics, ResourceMetrics, ScanningConditions,
    ScanningMode, ScanningState, ThermalState,
};
pub use error::{ErrorKind, Result, ScanError, Severity};
pub use events::{EventSubscription, Publisher, ScanEvent};
pub use quality::{QualityAggregator, QualityThresholds, ThresholdProvider};
pub use resources::{ResourceMonitor, ResourceReport, ResourceSampler};
pub use session::{
    FrameOutcome, InMemorySessionStore, ScanSession, SessionSnapshot, SessionStore,
    SessionSummary,
};
