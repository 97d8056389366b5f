//! Signal extractors.
//!
//! Turn one raw [`Frame`] into scalar quality signals:
//!
//! | Signal               | Source  | Module       |
//! |----------------------|---------|--------------|
//! | lighting level       | image   | `lighting`   |
//! | texture quality      | image   | `texture`    |
//! | motion stability     | pose    | `motion`     |
//! | surface complexity   | depth   | `depth`      |
//! | point density        | depth   | `depth`      |
//! | depth confidence     | depth   | `depth`      |
//! | noise level          | depth   | `depth`      |
//! | surface completeness | depth   | `depth`      |
//!
//! Depth-derived signals are optional: a missing depth buffer marks them
//! unavailable and the rest of the pipeline works with the partial set.
//! Malformed buffers fail the whole frame with `InvalidFrameData`.

pub mod depth;
pub mod lighting;
pub mod motion;
pub mod texture;

use serde::{Deserialize, Serialize};

pub use depth::DensityReading;
pub use lighting::{LumaGrid, luma};
pub use motion::MotionTracker;

use crate::core::clock::TimestampUs;
use crate::core::types::{
    CalibrationStatus, Frame, QualityMetrics, ScanningConditions, ScanningMode, SignalKind,
    TrackingState,
};
use crate::error::{Result, ScanError};

/// Extractor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Pixel stride of the luma sampling grid.
    /// Default: 10
    pub luma_stride: usize,

    /// Camera translation (metres) at which positional stability hits zero.
    /// Default: 0.1
    pub reference_distance: f32,

    /// Gradient spread (metres) mapped to full surface complexity.
    /// Default: 0.05
    pub complexity_reference: f32,

    /// Mean local depth deviation (metres) mapped to full noise.
    /// Default: 0.01
    pub noise_reference: f32,

    /// Laplacian variance mapped to full texture quality.
    /// Default: 0.01
    pub texture_reference: f32,

    /// Blocks per axis for surface completeness.
    /// Default: 8
    pub coverage_grid: usize,

    /// Minimum valid-depth fraction for LiDAR capture.
    /// Default: 0.5
    pub lidar_density_floor: f32,

    /// Minimum valid-depth fraction for hybrid capture.
    /// Default: 0.3
    pub hybrid_density_floor: f32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            luma_stride: 10,
            reference_distance: 0.1,
            complexity_reference: 0.05,
            noise_reference: 0.01,
            texture_reference: 0.01,
            coverage_grid: 8,
            lidar_density_floor: 0.5,
            hybrid_density_floor: 0.3,
        }
    }
}

impl SignalConfig {
    /// Depth density floor for a capture mode (photogrammetry has none).
    pub fn density_floor(&self, mode: ScanningMode) -> f32 {
        match mode {
            ScanningMode::Lidar => self.lidar_density_floor,
            ScanningMode::Hybrid => self.hybrid_density_floor,
            ScanningMode::Photogrammetry => 0.0,
        }
    }
}

/// Everything extracted from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSignals {
    pub timestamp_us: TimestampUs,
    pub lighting: f32,
    pub motion_stability: f32,
    pub texture_quality: f32,
    pub surface_complexity: Option<f32>,
    pub point_density: Option<DensityReading>,
    pub depth_confidence: Option<f32>,
    pub noise_level: Option<f32>,
    pub surface_completeness: Option<f32>,
    pub calibration: CalibrationStatus,
    /// Signals that could not be computed for this frame.
    pub unavailable: Vec<SignalKind>,
}

impl FrameSignals {
    /// Quality snapshot for the aggregator.
    pub fn to_metrics(&self) -> QualityMetrics {
        let feature_preservation = match self.noise_level {
            Some(noise) => (self.texture_quality + (1.0 - noise)) / 2.0,
            None => self.texture_quality,
        };
        QualityMetrics {
            timestamp_us: self.timestamp_us,
            lighting_score: self.lighting,
            motion_score: self.motion_stability,
            texture_quality: self.texture_quality,
            feature_preservation,
            point_density: self.point_density.map(|d| d.density),
            noise_level: self.noise_level,
            surface_completeness: self.surface_completeness,
            depth_confidence: self.depth_confidence,
            calibration: self.calibration,
        }
    }

    /// Conditions sample for arbitration. `fallback_complexity` stands in
    /// when the frame carried no depth.
    pub fn to_conditions(
        &self,
        device_performance: f32,
        battery_level: f32,
        fallback_complexity: f32,
    ) -> ScanningConditions {
        ScanningConditions {
            lighting_level: self.lighting,
            motion_stability: self.motion_stability,
            surface_complexity: self.surface_complexity.unwrap_or(fallback_complexity),
            device_performance,
            battery_level,
            timestamp_us: self.timestamp_us,
        }
    }

    /// Whether the depth density satisfies the sensor floor, treating absent
    /// depth as a miss.
    pub fn density_meets_floor(&self) -> bool {
        self.point_density.is_some_and(|d| d.meets_floor)
    }
}

/// Stateful bundle of extractors for one session.
#[derive(Debug, Clone)]
pub struct SignalExtractors {
    config: SignalConfig,
    motion: MotionTracker,
}

impl SignalExtractors {
    pub fn new(config: SignalConfig) -> Self {
        let motion = MotionTracker::new(config.reference_distance);
        Self { config, motion }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Extract every signal the frame supports.
    ///
    /// `mode` selects the depth density floor.
    pub fn extract(&mut self, frame: &Frame, mode: ScanningMode) -> Result<FrameSignals> {
        frame.image.validate()?;
        if let Some(depth) = &frame.depth {
            depth.validate()?;
        }

        let grid = LumaGrid::sample(&frame.image, self.config.luma_stride);
        let lighting = grid.mean();
        let texture_quality = texture::texture_quality(&grid, self.config.texture_reference);
        let motion_stability = self.motion.update(frame.pose);

        let depth_map = frame.depth.as_ref();
        let mut unavailable = Vec::new();

        let surface_complexity = available(
            depth::surface_complexity(depth_map, self.config.complexity_reference),
            &mut unavailable,
        )?;
        let point_density = available(
            depth::point_density(depth_map, self.config.density_floor(mode)),
            &mut unavailable,
        )?;
        let depth_confidence = available(depth::depth_confidence(depth_map), &mut unavailable)?;
        let noise_level = available(
            depth::noise_level(depth_map, self.config.noise_reference),
            &mut unavailable,
        )?;
        let surface_completeness = available(
            depth::surface_completeness(depth_map, self.config.coverage_grid),
            &mut unavailable,
        )?;

        if !unavailable.is_empty() && log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "Frame {}us: signals unavailable: {:?}",
                frame.timestamp_us,
                unavailable
            );
        }

        Ok(FrameSignals {
            timestamp_us: frame.timestamp_us,
            lighting,
            motion_stability,
            texture_quality,
            surface_complexity,
            point_density,
            depth_confidence,
            noise_level,
            surface_completeness,
            calibration: calibration_from_tracking(frame.tracking),
            unavailable,
        })
    }

    /// Forget motion history (after a pause or mode change).
    pub fn reset_motion(&mut self) {
        self.motion.reset();
    }
}

/// Map `SignalUnavailable` to `None` and record it; propagate anything else.
fn available<T>(result: Result<T>, unavailable: &mut Vec<SignalKind>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ScanError::SignalUnavailable(kind)) => {
            unavailable.push(kind);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn calibration_from_tracking(tracking: TrackingState) -> CalibrationStatus {
    match tracking {
        TrackingState::Normal => CalibrationStatus::Calibrated,
        TrackingState::Limited => CalibrationStatus::Limited,
        TrackingState::NotAvailable => CalibrationStatus::Uncalibrated,
    }
}
